//! Lock access that survives poisoning.
//!
//! Cache state stays usable after a panicking writer: the guard is taken over
//! and the event is logged once per acquisition.

use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use tracing::warn;

fn recover<G>(
    result: Result<G, PoisonError<G>>,
    component: &'static str,
    op: &'static str,
    kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            component,
            op,
            lock = kind,
            "lock poisoned by a panicked holder, continuing with its last state"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), component, op, "read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), component, op, "write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), component, op, "mutex")
}
