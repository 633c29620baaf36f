use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

const TARGET: &str = "tagcache::cache::lock";

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), op, "rwlock.read")
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), op, "rwlock.write")
}

/// Entries are swapped whole and never edited in place, so a poisoned guard
/// still holds consistent indices.
fn recover<G>(result: LockResult<G>, op: &'static str, lock_kind: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target: TARGET,
            op,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered from poisoned cache index lock"
        );
        poisoned.into_inner()
    })
}
