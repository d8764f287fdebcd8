//! Descriptor identifiers and send-path leases

use std::fmt;

use crate::flow_pools::PoolHandle;

/// Index of a descriptor slot in the global slab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(u32);

impl DescriptorId {
    /// Wrap a raw slot index
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw slot index
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A descriptor leased to the send path.
///
/// The lease keeps a handle to the pool it was drawn from, so completion can
/// find its way home even after the pool has been invalidated and its
/// identifier is gone. Hand it back with
/// [`FlowPoolManager::release_descriptor`](crate::FlowPoolManager::release_descriptor);
/// dropping it instead leaks the slot from the pool's point of view.
#[must_use = "leased descriptors must be released back to their pool"]
#[derive(Debug)]
pub struct TxDescriptor {
    id: DescriptorId,
    pool: PoolHandle,
}

impl TxDescriptor {
    pub(crate) fn new(id: DescriptorId, pool: PoolHandle) -> Self {
        Self { id, pool }
    }

    /// Slot index of this descriptor
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// Pool that currently owns this descriptor
    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub(crate) fn into_parts(self) -> (DescriptorId, PoolHandle) {
        (self.id, self.pool)
    }
}
