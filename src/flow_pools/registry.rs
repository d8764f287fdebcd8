//! Ordered registry of live flow pools

use std::sync::Arc;

use spin::{Mutex, MutexGuard};

use super::pool::{FlowPool, PoolHandle, PoolId, PoolState};

/// Insertion-ordered list of every pool that is active or waiting on
/// outstanding descriptors.
///
/// Lock order is registry, then pool, then slab. A pool lock taken while the
/// registry is held must come from [`RegistryGuard::lock_pool`], whose guard
/// cannot outlive the registry guard.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Mutex<Vec<PoolHandle>>,
}

/// Proof that the registry lock is held
pub struct RegistryGuard<'a> {
    pools: MutexGuard<'a, Vec<PoolHandle>>,
}

impl<'a> RegistryGuard<'a> {
    /// Nested pool lock, ordered under the registry lock
    pub(crate) fn lock_pool<'g>(&'g self, pool: &'g FlowPool) -> MutexGuard<'g, PoolState> {
        pool.lock()
    }

    /// Pools in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PoolHandle> {
        self.pools.iter()
    }

    /// Append at the tail
    pub fn push(&mut self, pool: PoolHandle) {
        self.pools.push(pool);
    }

    /// Unlink a pool; returns whether it was linked
    pub fn remove(&mut self, pool: &FlowPool) -> bool {
        match self.position(pool) {
            Some(index) => {
                self.pools.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pool: &FlowPool) -> bool {
        self.position(pool).is_some()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    fn position(&self, pool: &FlowPool) -> Option<usize> {
        self.pools
            .iter()
            .position(|linked| std::ptr::eq(Arc::as_ptr(linked), pool))
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the list-wide lock
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            pools: self.pools.lock(),
        }
    }

    pub fn insert(&self, pool: PoolHandle) {
        self.lock().push(pool);
    }

    pub fn remove(&self, pool: &FlowPool) -> bool {
        self.lock().remove(pool)
    }

    /// First pool carrying `pool_id`. Invalid pools have dropped their id and
    /// never match.
    pub fn lookup(&self, pool_id: PoolId) -> Option<PoolHandle> {
        let registry = self.lock();
        let found = registry
            .iter()
            .find(|pool| registry.lock_pool(pool).pool_id == Some(pool_id))
            .cloned();
        found
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Head of the list, without taking a reference
    pub fn first(&self) -> Option<PoolHandle> {
        self.lock().iter().next().cloned()
    }

    /// All linked pools, in order, without taking references
    pub fn pools(&self) -> Vec<PoolHandle> {
        self.lock().iter().cloned().collect()
    }

    /// Advance a referenced cursor.
    ///
    /// Returns the pool after `after` (or the head when `after` is `None`)
    /// with a temporary reference taken while the registry lock is held, so it
    /// cannot be unlinked before the caller drops that reference. The caller
    /// owns dropping it, outside the registry lock.
    pub fn next_referenced(&self, after: Option<&FlowPool>) -> Option<PoolHandle> {
        let registry = self.lock();
        let start = match after {
            None => 0,
            Some(current) => registry.position(current)? + 1,
        };
        let next = registry
            .iter()
            .skip(start)
            .find(|pool| pool.retain().is_ok())
            .cloned();
        next
    }
}
