//! Cache configuration.
//!
//! Resolved from the `[cache]` section of the settings; see
//! [`crate::config::CacheSettings`].

use std::num::NonZeroUsize;

use axum::http::HeaderName;

use super::canonical::KeyOrder;
use super::policy::Sloppiness;

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_GROUP_HEADER: &str = "x-access-group";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Probability of skipping tag-index compaction on eviction.
    pub sloppiness: Sloppiness,
    /// Object key ordering used when canonicalizing tags.
    pub key_order: KeyOrder,
    /// Largest backend body that is buffered for caching.
    pub max_body_bytes: NonZeroUsize,
    /// Header carrying the access group on requests and responses.
    pub group_header: HeaderName,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sloppiness: Sloppiness::THOROUGH,
            key_order: KeyOrder::Sorted,
            max_body_bytes: NonZeroUsize::new(DEFAULT_MAX_BODY_BYTES).unwrap_or(NonZeroUsize::MIN),
            group_header: HeaderName::from_static(DEFAULT_GROUP_HEADER),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            sloppiness: settings.sloppiness,
            key_order: KeyOrder::from_preserve_flag(settings.preserve_key_order),
            max_body_bytes: settings.max_body_bytes,
            group_header: settings.group_header.clone(),
        }
    }
}
