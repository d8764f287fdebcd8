//! Moving descriptors from a donor pool to deficient pools
//!
//! Only one pool lock is ever held at a time: descriptors travel through a
//! temporary batch, so two moves in opposite directions cannot deadlock.

use std::sync::Arc;

use crate::descriptors::DescriptorId;

use super::{
    control::FlowSignal,
    manager::FlowPoolManager,
    pool::{FlowPool, PoolHandle},
    registry::RegistryGuard,
};

/// Descriptors moved and the signals the recipients asked for
#[derive(Debug, Default)]
pub(crate) struct Transfer {
    pub(crate) moved: usize,
    pub(crate) signals: Vec<FlowSignal>,
}

impl Transfer {
    fn merge(&mut self, other: Transfer) {
        self.moved += other.moved;
        self.signals.extend(other.signals);
    }
}

/// Move up to `count` free descriptors from `donor` into `recipient`,
/// bounded by the recipient's deficiency. Unused descriptors go back to the
/// donor, whose capacity shrinks by what actually moved.
pub(crate) fn move_descriptors(
    registry: &RegistryGuard<'_>,
    donor: &FlowPool,
    recipient: &FlowPool,
    count: usize,
) -> Transfer {
    let mut transfer = Transfer::default();
    if count == 0 || std::ptr::eq(donor, recipient) {
        return transfer;
    }

    let mut batch = registry.lock_pool(donor).drain_free(count);
    if batch.is_empty() {
        return transfer;
    }

    {
        let mut target = registry.lock_pool(recipient);
        let (moved, signal) = target.absorb(&mut batch);
        transfer.moved = moved;
        transfer.signals.extend(signal);
    }

    let mut source = registry.lock_pool(donor);
    source.free_list.extend(batch);
    source.capacity -= transfer.moved as u16;
    transfer.signals.extend(source.after_draw());
    transfer
}

/// Walk the registry in order and top up every deficient active pool from
/// `donor` until it runs dry.
pub(crate) fn distribute_to_deficient(registry: &RegistryGuard<'_>, donor: &FlowPool) -> Transfer {
    let mut transfer = Transfer::default();
    let mut remaining = registry.lock_pool(donor).available() as usize;

    for pool in registry.iter() {
        if remaining == 0 {
            break;
        }
        if std::ptr::eq(Arc::as_ptr(pool), donor) {
            continue;
        }
        let deficit = {
            let state = registry.lock_pool(pool);
            if state.status.is_active() {
                state.deficient as usize
            } else {
                0
            }
        };
        if deficit == 0 {
            continue;
        }
        let step = move_descriptors(registry, donor, pool, deficit.min(remaining));
        remaining -= step.moved.min(remaining);
        transfer.merge(step);
    }
    transfer
}

/// Same walk for descriptors that no pool owns any more, such as the
/// free-list of a pool being deleted. Leftovers stay in `batch`.
pub(crate) fn distribute_batch(registry: &RegistryGuard<'_>, batch: &mut Vec<DescriptorId>) -> Transfer {
    let mut transfer = Transfer::default();
    for pool in registry.iter() {
        if batch.is_empty() {
            break;
        }
        let (moved, signal) = registry.lock_pool(pool).absorb(batch);
        transfer.moved += moved;
        transfer.signals.extend(signal);
    }
    transfer
}

impl FlowPoolManager {
    /// Move up to `count` descriptors from `donor` to `recipient`.
    ///
    /// Returns how many actually moved, which is capped by the recipient's
    /// deficiency and by the donor's free descriptors.
    pub fn move_descriptors(&self, donor: &PoolHandle, recipient: &PoolHandle, count: usize) -> usize {
        let transfer = {
            let registry = self.registry().lock();
            move_descriptors(&registry, donor, recipient, count)
        };
        self.deliver(transfer.signals);
        transfer.moved
    }

    /// Hand every free descriptor of `donor` to deficient pools, first
    /// registered first served. Returns the number moved.
    pub fn distribute_to_deficient(&self, donor: &PoolHandle) -> usize {
        let transfer = {
            let registry = self.registry().lock();
            distribute_to_deficient(&registry, donor)
        };
        if transfer.moved > 0 {
            log::debug!("{} donated {} descriptors", donor, transfer.moved);
        }
        self.deliver(transfer.signals);
        transfer.moved
    }

    /// Give orphaned descriptors to deficient pools, the rest to the slab
    pub(crate) fn donate(&self, mut batch: Vec<DescriptorId>) {
        if batch.is_empty() {
            return;
        }
        let transfer = {
            let registry = self.registry().lock();
            distribute_batch(&registry, &mut batch)
        };
        self.slab().give_all(batch);
        self.deliver(transfer.signals);
    }
}
