//! Backend tag header contract.
//!
//! A backend response may carry `cache-keys` (store this response under these
//! tags) and `clear-keys` (invalidate these tags). Each holds a JSON value or an
//! array of values. Both headers are removed before the response reaches the
//! client.

use axum::http::{HeaderMap, HeaderName};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::cache::{KeyOrder, Tag, canonicalize_all};

pub const CACHE_KEYS_HEADER: HeaderName = HeaderName::from_static("cache-keys");
pub const CLEAR_KEYS_HEADER: HeaderName = HeaderName::from_static("clear-keys");

#[derive(Debug, Error)]
pub enum TagHeaderError {
    #[error("`{header}` header is not valid UTF-8")]
    Encoding { header: HeaderName },
    #[error("`{header}` header is not valid JSON: {source}")]
    Json {
        header: HeaderName,
        #[source]
        source: serde_json::Error,
    },
}

/// Tag instructions lifted off one backend response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagDirectives {
    /// Tags to invalidate; applied first.
    pub clear: Option<Vec<Tag>>,
    /// Tags to store the response under.
    pub cache: Option<Vec<Tag>>,
}

impl TagDirectives {
    pub fn is_empty(&self) -> bool {
        self.clear.is_none() && self.cache.is_none()
    }
}

/// Parse a JSON tag list. A non-array value is a list of one.
pub fn parse_tag_list(raw: &str, order: KeyOrder) -> Result<Vec<Tag>, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(match value {
        Value::Array(items) => canonicalize_all(&items, order),
        single => canonicalize_all([&single], order),
    })
}

/// Remove both tag headers from `headers` and parse them.
///
/// A header that fails to parse is dropped with a warning; the response it came
/// with is still forwarded.
pub fn take_directives(headers: &mut HeaderMap, order: KeyOrder) -> TagDirectives {
    TagDirectives {
        clear: take_header(headers, CLEAR_KEYS_HEADER, order),
        cache: take_header(headers, CACHE_KEYS_HEADER, order),
    }
}

fn take_header(headers: &mut HeaderMap, header: HeaderName, order: KeyOrder) -> Option<Vec<Tag>> {
    // `remove` drops every value of the header and returns the first.
    let value = headers.remove(&header)?;
    let parsed = value
        .to_str()
        .map_err(|_| TagHeaderError::Encoding {
            header: header.clone(),
        })
        .and_then(|raw| {
            parse_tag_list(raw, order).map_err(|source| TagHeaderError::Json {
                header: header.clone(),
                source,
            })
        });

    match parsed {
        Ok(tags) => Some(tags),
        Err(error) => {
            warn!(
                target: "tagcache::intercept",
                error = %error,
                "ignoring malformed tag header"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::cache::canonicalize;

    fn tag(value: Value) -> Tag {
        canonicalize(&value, KeyOrder::Sorted)
    }

    #[test]
    fn scalar_is_a_single_tag() {
        let tags = parse_tag_list(r#""widget""#, KeyOrder::Sorted).expect("valid");
        assert_eq!(tags, vec![tag(json!("widget"))]);
    }

    #[test]
    fn object_is_a_single_tag() {
        let tags = parse_tag_list(r#"{"type":"widget","id":1}"#, KeyOrder::Sorted).expect("valid");
        assert_eq!(tags, vec![tag(json!({"id": 1, "type": "widget"}))]);
    }

    #[test]
    fn array_elements_become_tags() {
        let tags = parse_tag_list(r#"[{"b":1,"a":2}, 3, null]"#, KeyOrder::Sorted).expect("valid");
        assert_eq!(
            tags.iter().map(Tag::as_str).collect::<Vec<_>>(),
            vec![r#"{"a":2,"b":1}"#, "3", "null"]
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_tag_list("[{", KeyOrder::Sorted).is_err());
    }

    #[test]
    fn take_directives_strips_both_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_KEYS_HEADER, HeaderValue::from_static(r#"["a"]"#));
        headers.insert(CLEAR_KEYS_HEADER, HeaderValue::from_static(r#""b""#));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let directives = take_directives(&mut headers, KeyOrder::Sorted);

        assert_eq!(directives.cache, Some(vec![tag(json!("a"))]));
        assert_eq!(directives.clear, Some(vec![tag(json!("b"))]));
        assert!(!headers.contains_key(CACHE_KEYS_HEADER));
        assert!(!headers.contains_key(CLEAR_KEYS_HEADER));
        assert!(headers.contains_key("content-type"));
    }

    #[test]
    fn malformed_header_is_stripped_and_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_KEYS_HEADER, HeaderValue::from_static("not json"));

        let directives = take_directives(&mut headers, KeyOrder::Sorted);

        assert!(directives.is_empty());
        assert!(!headers.contains_key(CACHE_KEYS_HEADER));
    }

    #[test]
    fn absent_headers_yield_no_directives() {
        let mut headers = HeaderMap::new();
        assert!(take_directives(&mut headers, KeyOrder::Sorted).is_empty());
    }
}
