//! Tag-indexed response cache.
//!
//! Two indices back the cache:
//!
//! - **Primary**: `(request key, access group) → entry`. The only index that
//!   answers hits.
//! - **Tags**: `tag → request key → {access group}`. Drives invalidation
//!   ([`TagStore::flush`]) and queries ([`TagStore::filter`]).
//!
//! Tags arrive as JSON from the backend and are reduced to canonical strings by
//! [`canonicalize`]. Cleanup of the tag index after an eviction can be skipped
//! with a configurable probability ([`Sloppiness`]), trading memory for
//! throughput without affecting which entries are served.

mod canonical;
mod config;
mod entry;
mod index;
mod keys;
mod lock;
mod policy;
mod store;

pub use canonical::{KeyOrder, canonicalize, canonicalize_all};
pub use config::{CacheConfig, DEFAULT_GROUP_HEADER, DEFAULT_MAX_BODY_BYTES};
pub use entry::CacheEntry;
pub use keys::{AccessGroup, RequestKey, Tag};
pub use policy::Sloppiness;
pub use store::{CacheSize, FlushReport, Indices, TagStore};
