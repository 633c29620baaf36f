//! Secondary tag index.
//!
//! Maps each tag to the `(request key, access group)` pairs it protects. The
//! index is derived data: it drives flushes and queries but never answers a
//! hit, and may hold stale pairs after a lazy flush.

use std::collections::{HashMap, HashSet};

use super::keys::{AccessGroup, RequestKey, Tag};

pub(crate) type Bucket = HashMap<RequestKey, HashSet<AccessGroup>>;

#[derive(Debug, Default)]
pub(crate) struct TagIndex {
    buckets: HashMap<Tag, Bucket>,
}

impl TagIndex {
    pub(crate) fn register(&mut self, tag: &Tag, request_key: &RequestKey, group: &AccessGroup) {
        self.buckets
            .entry(tag.clone())
            .or_default()
            .entry(request_key.clone())
            .or_default()
            .insert(group.clone());
    }

    /// Drop one membership, pruning maps that become empty.
    pub(crate) fn unregister(&mut self, tag: &Tag, request_key: &RequestKey, group: &AccessGroup) {
        let Some(bucket) = self.buckets.get_mut(tag) else {
            return;
        };
        if let Some(groups) = bucket.get_mut(request_key) {
            groups.remove(group);
            if groups.is_empty() {
                bucket.remove(request_key);
            }
        }
        if bucket.is_empty() {
            self.buckets.remove(tag);
        }
    }

    /// Remove a tag's bucket and hand it to the caller.
    pub(crate) fn take(&mut self, tag: &Tag) -> Option<Bucket> {
        self.buckets.remove(tag)
    }

    pub(crate) fn bucket(&self, tag: &Tag) -> Option<&Bucket> {
        self.buckets.get(tag)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, tag: &Tag, request_key: &RequestKey, group: &AccessGroup) -> bool {
        self.buckets
            .get(tag)
            .and_then(|bucket| bucket.get(request_key))
            .is_some_and(|groups| groups.contains(group))
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::cache::{KeyOrder, canonicalize};

    fn tag(value: serde_json::Value) -> Tag {
        canonicalize(&value, KeyOrder::Sorted)
    }

    fn key(target: &str) -> RequestKey {
        RequestKey::new(&Method::GET, target)
    }

    #[test]
    fn register_groups_under_one_request_key() {
        let mut index = TagIndex::default();
        let widget = tag(json!({"type": "widget"}));

        index.register(&widget, &key("/me"), &AccessGroup::public());
        index.register(&widget, &key("/me"), &AccessGroup::new("admin"));

        let bucket = index.bucket(&widget).expect("bucket exists");
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[&key("/me")].len(), 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn unregister_prunes_empty_buckets() {
        let mut index = TagIndex::default();
        let widget = tag(json!("widget"));

        index.register(&widget, &key("/a"), &AccessGroup::public());
        index.register(&widget, &key("/b"), &AccessGroup::public());

        index.unregister(&widget, &key("/a"), &AccessGroup::public());
        assert!(!index.contains(&widget, &key("/a"), &AccessGroup::public()));
        assert!(index.contains(&widget, &key("/b"), &AccessGroup::public()));

        index.unregister(&widget, &key("/b"), &AccessGroup::public());
        assert!(index.bucket(&widget).is_none());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn unregister_unknown_membership_is_a_no_op() {
        let mut index = TagIndex::default();
        let widget = tag(json!("widget"));
        index.register(&widget, &key("/a"), &AccessGroup::public());

        index.unregister(&tag(json!("gadget")), &key("/a"), &AccessGroup::public());
        index.unregister(&widget, &key("/a"), &AccessGroup::new("admin"));

        assert!(index.contains(&widget, &key("/a"), &AccessGroup::public()));
    }

    #[test]
    fn take_removes_the_bucket() {
        let mut index = TagIndex::default();
        let widget = tag(json!("widget"));
        index.register(&widget, &key("/a"), &AccessGroup::public());

        let bucket = index.take(&widget).expect("bucket");
        assert!(bucket.contains_key(&key("/a")));
        assert!(index.take(&widget).is_none());
    }

    #[test]
    fn clear_removes_all_buckets() {
        let mut index = TagIndex::default();
        index.register(&tag(json!(1)), &key("/a"), &AccessGroup::public());
        index.register(&tag(json!(2)), &key("/b"), &AccessGroup::public());

        index.clear();
        assert_eq!(index.len(), 0);
    }
}
