//! Cache key definitions.
//!
//! `RequestKey` identifies a request, `AccessGroup` partitions visibility and
//! `Tag` names an invalidation key. All three are plain strings underneath; the
//! newtypes keep them from being mixed up in the index signatures.

use std::borrow::Borrow;
use std::fmt;

use axum::http::{HeaderMap, HeaderName, Method};
use serde::Serialize;

/// Canonical invalidation key, produced by [`super::canonicalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub(crate) fn from_canonical(canonical: String) -> Self {
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `"<METHOD> <request target>"`. Headers and body never take part, so two
/// requests with the same method and raw target share an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &Method, target: &str) -> Self {
        Self(format!("{} {}", method.as_str(), target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authorization scope an entry is visible to. Matching is exact; `PUBLIC` is
/// just another bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AccessGroup(String);

impl AccessGroup {
    pub const PUBLIC: &'static str = "PUBLIC";

    pub fn new(group: impl Into<String>) -> Self {
        Self(group.into())
    }

    pub fn public() -> Self {
        Self(Self::PUBLIC.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Group of an inbound request: its group header, else `PUBLIC`.
    pub fn from_request(request_headers: &HeaderMap, header: &HeaderName) -> Self {
        header_group(request_headers, header).unwrap_or_else(Self::public)
    }

    /// Group a backend response is stored under: the response header wins over
    /// the originating request's header, then `PUBLIC`.
    pub fn resolve(
        response_headers: &HeaderMap,
        request_headers: &HeaderMap,
        header: &HeaderName,
    ) -> Self {
        header_group(response_headers, header)
            .or_else(|| header_group(request_headers, header))
            .unwrap_or_else(Self::public)
    }
}

impl fmt::Display for AccessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn header_group(headers: &HeaderMap, header: &HeaderName) -> Option<AccessGroup> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(AccessGroup::new)
}
