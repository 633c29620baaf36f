use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::{Serialize, Serializer};

use super::keys::{AccessGroup, RequestKey, Tag};

/// One stored backend response.
///
/// Entries are immutable and shared behind `Arc`; replacing one swaps the whole
/// value so readers never see tags from one write and a body from another.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    request_key: RequestKey,
    access_group: AccessGroup,
    tags: Vec<Tag>,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl CacheEntry {
    /// Duplicate tags are dropped, keeping the first occurrence.
    pub fn new(
        request_key: RequestKey,
        access_group: AccessGroup,
        tags: Vec<Tag>,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let mut seen = HashSet::with_capacity(tags.len());
        let tags = tags
            .into_iter()
            .filter(|tag| seen.insert(tag.clone()))
            .collect();

        Self {
            request_key,
            access_group,
            tags,
            status,
            headers,
            body,
        }
    }

    pub fn request_key(&self) -> &RequestKey {
        &self.request_key
    }

    pub fn access_group(&self) -> &AccessGroup {
        &self.access_group
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryView<'a> {
    request_key: &'a RequestKey,
    access_group: &'a AccessGroup,
    keys: &'a [Tag],
    status: u16,
    headers: BTreeMap<&'a str, String>,
    data: Cow<'a, str>,
}

impl Serialize for CacheEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut headers: BTreeMap<&str, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes());
            headers
                .entry(name.as_str())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(&value);
                })
                .or_insert_with(|| value.into_owned());
        }

        EntryView {
            request_key: &self.request_key,
            access_group: &self.access_group,
            keys: &self.tags,
            status: self.status.as_u16(),
            headers,
            data: String::from_utf8_lossy(&self.body),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Method, header};
    use serde_json::json;

    use super::*;
    use crate::cache::{KeyOrder, canonicalize};

    fn tag(value: serde_json::Value) -> Tag {
        canonicalize(&value, KeyOrder::Sorted)
    }

    #[test]
    fn duplicate_tags_are_collapsed_in_order() {
        let entry = CacheEntry::new(
            RequestKey::new(&Method::GET, "/widgets"),
            AccessGroup::public(),
            vec![tag(json!("b")), tag(json!("a")), tag(json!("b"))],
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"W1"),
        );

        assert_eq!(entry.tags(), &[tag(json!("b")), tag(json!("a"))]);
        assert!(entry.has_tag(&tag(json!("a"))));
        assert!(!entry.has_tag(&tag(json!("c"))));
    }

    #[test]
    fn serializes_with_listing_field_names() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.append("x-trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));

        let entry = CacheEntry::new(
            RequestKey::new(&Method::GET, "/widgets"),
            AccessGroup::new("admin"),
            vec![tag(json!({"type": "widget"}))],
            StatusCode::OK,
            headers,
            Bytes::from_static(b"W1"),
        );

        let value = serde_json::to_value(&entry).expect("serializable");
        assert_eq!(
            value,
            json!({
                "requestKey": "GET /widgets",
                "accessGroup": "admin",
                "keys": ["{\"type\":\"widget\"}"],
                "status": 200,
                "headers": {"content-type": "text/plain", "x-trace": "a, b"},
                "data": "W1"
            })
        );
    }
}
