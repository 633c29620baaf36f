//! Cache storage.
//!
//! [`Indices`] holds the primary index and the tag index and implements the
//! store, invalidation and query algorithms single-threaded. [`TagStore`] wraps
//! it in one `RwLock` together with the cleanup RNG and is what request
//! handlers share.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use metrics::counter;
use serde::Serialize;
use tracing::debug;

use super::config::CacheConfig;
use super::entry::CacheEntry;
use super::index::TagIndex;
use super::keys::{AccessGroup, RequestKey, Tag};
use super::lock;
use super::policy::Sloppiness;

const TARGET: &str = "tagcache::cache::store";

/// Distinct request identities and distinct tags currently indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSize {
    pub requests: usize,
    pub keys: usize,
}

/// Outcome of one flush call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub entries_removed: usize,
    pub compactions_skipped: usize,
}

type GroupMap = HashMap<AccessGroup, Arc<CacheEntry>>;

// ============================================================================
// Indices
// ============================================================================

#[derive(Debug, Default)]
pub struct Indices {
    requests: HashMap<RequestKey, GroupMap>,
    tags: TagIndex,
}

impl Indices {
    /// Insert or replace the entry at `(request key, access group)`.
    ///
    /// Tags the replaced entry carried but the new one does not lose their
    /// reference to this slot. Returns the replaced entry.
    pub fn put(&mut self, entry: Arc<CacheEntry>) -> Option<Arc<CacheEntry>> {
        let request_key = entry.request_key().clone();
        let group = entry.access_group().clone();

        for tag in entry.tags() {
            self.tags.register(tag, &request_key, &group);
        }

        let previous = self
            .requests
            .entry(request_key.clone())
            .or_default()
            .insert(group.clone(), Arc::clone(&entry));

        if let Some(previous) = previous.as_ref() {
            for tag in previous.tags() {
                if !entry.has_tag(tag) {
                    self.tags.unregister(tag, &request_key, &group);
                }
            }
        }

        previous
    }

    pub fn get(&self, request_key: &RequestKey, group: &AccessGroup) -> Option<Arc<CacheEntry>> {
        self.entry(request_key, group).cloned()
    }

    /// Evict every entry carrying any of `tags`, across all access groups.
    ///
    /// Each evicted entry draws once from `sloppiness`; unless the draw says
    /// skip, the entry's references under its other tags are removed too. The
    /// flushed tags' own buckets are always dropped.
    pub fn flush(
        &mut self,
        tags: &[Tag],
        sloppiness: Sloppiness,
        rng: &mut fastrand::Rng,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        for tag in tags {
            let Some(bucket) = self.tags.take(tag) else {
                continue;
            };

            for (request_key, groups) in bucket {
                for group in groups {
                    // A lazy flush can leave this reference behind after the
                    // slot was rewritten with a different tag set.
                    let carries_tag = self
                        .entry(&request_key, &group)
                        .is_some_and(|entry| entry.has_tag(tag));
                    if !carries_tag {
                        continue;
                    }

                    let Some(evicted) = self.remove(&request_key, &group) else {
                        continue;
                    };
                    report.entries_removed += 1;

                    if sloppiness.skip_compaction(rng) {
                        report.compactions_skipped += 1;
                        continue;
                    }

                    for other in evicted.tags().iter().filter(|other| *other != tag) {
                        self.tags.unregister(other, &request_key, &group);
                    }
                }
            }
        }

        report
    }

    /// Entries carrying at least one of `tags`, without duplicates, ordered by
    /// `(request key, access group)`. An empty tag list matches nothing.
    pub fn filter(&self, tags: &[Tag]) -> Vec<Arc<CacheEntry>> {
        let mut seen: HashSet<(&RequestKey, &AccessGroup)> = HashSet::new();
        let mut matched = Vec::new();

        for tag in tags {
            let Some(bucket) = self.tags.bucket(tag) else {
                continue;
            };
            for (request_key, groups) in bucket {
                for group in groups {
                    let Some(entry) = self.entry(request_key, group) else {
                        continue;
                    };
                    if entry.has_tag(tag) && seen.insert((request_key, group)) {
                        matched.push(Arc::clone(entry));
                    }
                }
            }
        }

        sort_entries(&mut matched);
        matched
    }

    /// Every stored entry, ordered by `(request key, access group)`.
    pub fn entries(&self) -> Vec<Arc<CacheEntry>> {
        let mut all: Vec<Arc<CacheEntry>> = self
            .requests
            .values()
            .flat_map(|groups| groups.values().cloned())
            .collect();
        sort_entries(&mut all);
        all
    }

    pub fn size(&self) -> CacheSize {
        CacheSize {
            requests: self.requests.len(),
            keys: self.tags.len(),
        }
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.tags.clear();
    }

    fn entry(&self, request_key: &RequestKey, group: &AccessGroup) -> Option<&Arc<CacheEntry>> {
        self.requests
            .get(request_key)
            .and_then(|groups| groups.get(group))
    }

    fn remove(&mut self, request_key: &RequestKey, group: &AccessGroup) -> Option<Arc<CacheEntry>> {
        let groups = self.requests.get_mut(request_key)?;
        let removed = groups.remove(group);
        if groups.is_empty() {
            self.requests.remove(request_key);
        }
        removed
    }
}

fn sort_entries(entries: &mut [Arc<CacheEntry>]) {
    entries.sort_by(|left, right| {
        left.request_key()
            .cmp(right.request_key())
            .then_with(|| left.access_group().cmp(right.access_group()))
    });
}

// ============================================================================
// TagStore: shared, lock-guarded store
// ============================================================================

struct State {
    indices: Indices,
    rng: fastrand::Rng,
}

/// The process-wide cache. Readers share the lock, writers are exclusive, and
/// no await point is ever reached while it is held.
pub struct TagStore {
    state: RwLock<State>,
    sloppiness: Sloppiness,
}

impl TagStore {
    /// Create an empty store; the cleanup RNG is seeded from entropy.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_rng(config, fastrand::Rng::new())
    }

    /// Create an empty store with a caller-supplied RNG, for reproducible
    /// cleanup decisions.
    pub fn with_rng(config: &CacheConfig, rng: fastrand::Rng) -> Self {
        Self {
            state: RwLock::new(State {
                indices: Indices::default(),
                rng,
            }),
            sloppiness: config.sloppiness,
        }
    }

    pub fn sloppiness(&self) -> Sloppiness {
        self.sloppiness
    }

    pub fn put(&self, entry: CacheEntry) {
        let entry = Arc::new(entry);
        let mut state = lock::write(&self.state, "put");
        let replaced = state.indices.put(Arc::clone(&entry)).is_some();
        drop(state);

        counter!("tagcache_store_total").increment(1);
        debug!(
            target: TARGET,
            request_key = %entry.request_key(),
            access_group = %entry.access_group(),
            tags = entry.tags().len(),
            replaced,
            "stored cache entry"
        );
    }

    pub fn get(&self, request_key: &RequestKey, group: &AccessGroup) -> Option<Arc<CacheEntry>> {
        lock::read(&self.state, "get").indices.get(request_key, group)
    }

    /// Flush with the store's configured sloppiness.
    pub fn flush(&self, tags: &[Tag]) -> FlushReport {
        self.flush_with(tags, self.sloppiness)
    }

    /// Flush with an explicit sloppiness, overriding the configured one.
    pub fn flush_with(&self, tags: &[Tag], sloppiness: Sloppiness) -> FlushReport {
        let report = {
            let mut guard = lock::write(&self.state, "flush");
            let State { indices, rng } = &mut *guard;
            indices.flush(tags, sloppiness, rng)
        };

        counter!("tagcache_flush_entries_total").increment(report.entries_removed as u64);
        debug!(
            target: TARGET,
            tags = tags.len(),
            entries_removed = report.entries_removed,
            compactions_skipped = report.compactions_skipped,
            "flushed tags"
        );
        report
    }

    pub fn filter(&self, tags: &[Tag]) -> Vec<Arc<CacheEntry>> {
        lock::read(&self.state, "filter").indices.filter(tags)
    }

    pub fn entries(&self) -> Vec<Arc<CacheEntry>> {
        lock::read(&self.state, "entries").indices.entries()
    }

    pub fn size(&self) -> CacheSize {
        lock::read(&self.state, "size").indices.size()
    }

    pub fn clear(&self) {
        lock::write(&self.state, "clear").indices.clear();
    }
}
