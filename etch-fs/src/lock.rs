//! Per-identity readers-writer locks.

use std::sync::Arc;

use dashmap::DashMap;
use etch_core::ResourceId;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type Locks = DashMap<ResourceId, Arc<RwLock<()>>>;

/// Table of lazily created locks, one per identity currently in use.
///
/// A lock lives in the table only while somebody holds or waits for it, so the table
/// does not grow with the number of stored resources.
#[derive(Clone, Default)]
pub(crate) struct LockTable {
    locks: Arc<Locks>,
}

impl LockTable {
    pub(crate) async fn read(&self, id: &ResourceId) -> EntryGuard<OwnedRwLockReadGuard<()>> {
        let guard = self.lock_for(id).read_owned().await;
        EntryGuard::new(guard, self.locks.clone(), id.clone())
    }

    pub(crate) async fn write(&self, id: &ResourceId) -> EntryGuard<OwnedRwLockWriteGuard<()>> {
        let guard = self.lock_for(id).write_owned().await;
        EntryGuard::new(guard, self.locks.clone(), id.clone())
    }

    fn lock_for(&self, id: &ResourceId) -> Arc<RwLock<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held lock on one identity; unregisters the lock when it is the last user.
pub(crate) struct EntryGuard<G> {
    guard: Option<G>,
    locks: Arc<Locks>,
    id: ResourceId,
}

impl<G> EntryGuard<G> {
    fn new(guard: G, locks: Arc<Locks>, id: ResourceId) -> Self {
        Self {
            guard: Some(guard),
            locks,
            id,
        }
    }
}

impl<G> Drop for EntryGuard<G> {
    fn drop(&mut self) {
        // The owned guard keeps its own Arc to the lock; release it first.
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
