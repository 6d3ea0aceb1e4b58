use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

const SOURCE: &str = "cache::lock";

pub(crate) fn read_guard<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(op, "rwlock.read");
        poisoned.into_inner()
    })
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(op, "rwlock.write");
        poisoned.into_inner()
    })
}

fn report_poisoned(op: &'static str, lock_kind: &'static str) {
    warn!(
        op,
        target_module = SOURCE,
        lock_kind,
        result = "poisoned_recovered",
        hint = "slot layout may be stale after panic in another thread",
        "Recovered from poisoned cache lock"
    );
}
