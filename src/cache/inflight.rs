//! Per-key miss coalescing.
//!
//! The first request to miss on a key runs the dispatcher; concurrent requests
//! for the same key wait on its lock and then find the stored response.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::keys::CacheKey;

type Slots = Arc<DashMap<CacheKey, Slot>>;

#[derive(Default)]
struct Slot {
    lock: Arc<Mutex<()>>,
    /// Requests holding or waiting for `lock`.
    users: usize,
}

#[derive(Default, Clone)]
pub struct InFlight {
    slots: Slots,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds `key`, then hold it until the guard drops.
    ///
    /// Dropping the returned future while it waits gives up the place in line.
    pub async fn acquire(&self, key: &CacheKey) -> InFlightGuard {
        let lock = {
            let mut slot = self.slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        let registration = Registration {
            key: key.clone(),
            slots: Arc::clone(&self.slots),
        };
        let permit = lock.lock_owned().await;
        InFlightGuard {
            _permit: permit,
            _registration: registration,
        }
    }

    /// Number of keys with a running or waiting request.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One request's claim on a slot; the last claim out removes it.
struct Registration {
    key: CacheKey,
    slots: Slots,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.slots.remove_if_mut(&self.key, |_, slot| {
            slot.users -= 1;
            slot.users == 0
        });
    }
}

/// Fields drop in order: the lock is released before the slot is given up.
pub struct InFlightGuard {
    _permit: OwnedMutexGuard<()>,
    _registration: Registration,
}
