//! Per-key advisory locks.
//!
//! A command that reads a record, waits on the user and then writes the
//! record back holds the key's lock across the whole exchange. Other flows
//! touching the same key wait; everything else proceeds.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::types::RecordKey;

/// Registry of advisory locks, one per record key, created on demand.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    locks: Arc<DashMap<RecordKey, Arc<Mutex<()>>>>,
}

/// Held locks; released on drop. Entries nobody else holds or waits on
/// leave the registry with it.
#[derive(Debug)]
pub struct KeyGuard {
    keys: Vec<RecordKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    registry: Arc<DashMap<RecordKey, Arc<Mutex<()>>>>,
}

impl KeyGuard {
    /// Keys held by this guard, in acquisition order.
    #[must_use]
    pub fn keys(&self) -> &[RecordKey] {
        &self.keys
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Waiters keep their own clone of the slot, so a count of one
            // means only the registry still points at it.
            self.registry
                .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
        }
    }
}

impl KeyLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: RecordKey) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key).or_default().value())
    }

    /// Wait for exclusive use of `key`.
    pub async fn acquire(&self, key: RecordKey) -> KeyGuard {
        self.acquire_many(&[key]).await
    }

    /// Wait for exclusive use of every key in `keys`.
    ///
    /// Keys are taken in sorted order, so two callers locking overlapping
    /// sets cannot deadlock. Duplicates are locked once.
    pub async fn acquire_many(&self, keys: &[RecordKey]) -> KeyGuard {
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in &sorted {
            guards.push(self.slot(*key).lock_owned().await);
            trace!(key = %key, "advisory lock acquired");
        }
        KeyGuard {
            keys: sorted,
            guards,
            registry: Arc::clone(&self.locks),
        }
    }

    /// Whether `key` is currently held by someone.
    #[must_use]
    pub fn is_locked(&self, key: &RecordKey) -> bool {
        self.locks
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Drop registry entries nobody holds or waits on. Returns how many
    /// entries were removed. Guards already clean up after themselves; this
    /// sweeps whatever a cancelled waiter left behind.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - self.locks.len()
    }

    /// Number of keys with a registry entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
