use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Take the guard out of a poisoned lock, logging where it happened.
///
/// Cache state stays usable after a panicking writer; at worst an entry is stale.
fn recover<G>(
    poisoned: PoisonError<G>,
    target: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    warn!(
        op,
        target_module = target,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, target, op, "rwlock.read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, target, op, "rwlock.write"))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, target, op, "mutex.lock"))
}
