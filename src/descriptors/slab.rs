//! Global descriptor slab

use std::fmt;

use spin::Mutex;

use super::descriptor::DescriptorId;

/// Supply of descriptors that flow pools draw from and return to.
///
/// Implementations take their own lock internally; it sits at the bottom of
/// the lock hierarchy, so callers may hold a pool lock but never the other
/// way round.
pub trait DescriptorSource: Send + Sync + fmt::Debug {
    /// Take up to `count` free descriptors. Fewer are returned when the
    /// supply runs short.
    fn take(&self, count: usize) -> Vec<DescriptorId>;

    /// Return a single descriptor
    fn give(&self, descriptor: DescriptorId);

    /// Return a batch of descriptors under one lock acquisition
    fn give_all(&self, descriptors: Vec<DescriptorId>) {
        for descriptor in descriptors {
            self.give(descriptor);
        }
    }

    /// Number of descriptors currently free in the source
    fn free_count(&self) -> usize;

    /// Number of descriptors the source was created with
    fn total(&self) -> usize;
}

/// Point-in-time view of the slab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlabStats {
    /// Descriptors minted at bring-up
    pub total: usize,
    /// Descriptors sitting in the slab free-list
    pub free: usize,
    /// Returns that were rejected as duplicates or out of range
    pub rejected_returns: usize,
}

#[derive(Debug)]
struct SlabInner {
    free_list: Vec<DescriptorId>,
    in_slab: Vec<bool>,
    rejected_returns: usize,
}

/// Fixed-size descriptor slab backed by an index free-list
#[derive(Debug)]
pub struct DescriptorSlab {
    inner: Mutex<SlabInner>,
    total: usize,
}

impl DescriptorSlab {
    /// Mint `total` descriptors, all initially free
    pub fn new(total: usize) -> Self {
        // Reversed so that take() hands out low indices first
        let free_list = (0..total as u32).rev().map(DescriptorId::new).collect();
        Self {
            inner: Mutex::new(SlabInner {
                free_list,
                in_slab: vec![true; total],
                rejected_returns: 0,
            }),
            total,
        }
    }

    /// Current slab statistics
    pub fn stats(&self) -> SlabStats {
        let inner = self.inner.lock();
        SlabStats {
            total: self.total,
            free: inner.free_list.len(),
            rejected_returns: inner.rejected_returns,
        }
    }

    fn put_locked(inner: &mut SlabInner, total: usize, descriptor: DescriptorId) {
        let index = descriptor.index() as usize;
        if index >= total || inner.in_slab[index] {
            inner.rejected_returns += 1;
            log::error!("rejecting return of descriptor {} to slab", descriptor);
            return;
        }
        inner.in_slab[index] = true;
        inner.free_list.push(descriptor);
    }
}

impl DescriptorSource for DescriptorSlab {
    fn take(&self, count: usize) -> Vec<DescriptorId> {
        let mut inner = self.inner.lock();
        let count = count.min(inner.free_list.len());
        let split = inner.free_list.len() - count;
        let taken: Vec<DescriptorId> = inner.free_list.drain(split..).rev().collect();
        for descriptor in &taken {
            inner.in_slab[descriptor.index() as usize] = false;
        }
        taken
    }

    fn give(&self, descriptor: DescriptorId) {
        let mut inner = self.inner.lock();
        Self::put_locked(&mut inner, self.total, descriptor);
    }

    fn give_all(&self, descriptors: Vec<DescriptorId>) {
        if descriptors.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for descriptor in descriptors {
            Self::put_locked(&mut inner, self.total, descriptor);
        }
    }

    fn free_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    fn total(&self) -> usize {
        self.total
    }
}
