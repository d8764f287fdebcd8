//! Individual flow pool implementation

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde::Serialize;
use spin::{Mutex, MutexGuard};

use crate::{
    descriptors::DescriptorId,
    error::{FlowPoolError, Result},
};

use super::control::FlowSignal;

/// Pool identifier assigned by firmware
pub type PoolId = u8;

/// Flow (interface) identifier
pub type FlowId = u8;

/// Shared handle to a flow pool
pub type PoolHandle = Arc<FlowPool>;

/// Lifecycle state of a flow pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PoolStatus {
    /// Descriptors flow freely
    ActiveUnpaused,
    /// Occupancy hit the stop threshold and the flow was paused
    ActivePaused,
    /// Deleted while descriptors were still outstanding
    Invalid,
    /// Terminal; holds nothing
    Inactive,
}

impl PoolStatus {
    /// Whether descriptors may be drawn and the pool may receive top-ups
    pub fn is_active(self) -> bool {
        matches!(self, Self::ActiveUnpaused | Self::ActivePaused)
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ActiveUnpaused => "active",
            Self::ActivePaused => "paused",
            Self::Invalid => "invalid",
            Self::Inactive => "inactive",
        };
        f.write_str(name)
    }
}

/// Occupancy watermarks in descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Thresholds {
    pub start: u16,
    pub stop: u16,
}

/// Mutable pool state, only reachable through the pool lock
#[derive(Debug)]
pub(crate) struct PoolState {
    pub(crate) pool_id: Option<PoolId>,
    pub(crate) member_flow: Option<FlowId>,
    pub(crate) status: PoolStatus,
    pub(crate) free_list: Vec<DescriptorId>,
    pub(crate) capacity: u16,
    pub(crate) deficient: u16,
    pub(crate) in_flight: u16,
    pub(crate) surplus: u16,
    pub(crate) thresholds: Thresholds,
    pub(crate) pkt_drop_no_desc: u64,
}

/// Result of handing a leased descriptor back to its pool
#[derive(Debug, Default)]
pub(crate) struct ReleaseOutcome {
    pub(crate) signal: Option<FlowSignal>,
    /// Descriptor the pool no longer wants; goes to deficient pools or the slab
    pub(crate) shed: Option<DescriptorId>,
    /// Last outstanding descriptor of an invalid pool came home
    pub(crate) reclaim: bool,
}

/// Result of the locked part of pool deletion
#[derive(Debug)]
pub(crate) struct DeleteOutcome {
    pub(crate) status: PoolStatus,
    pub(crate) was_invalid: bool,
    pub(crate) drained: Vec<DescriptorId>,
}

impl PoolState {
    pub(crate) fn available(&self) -> u16 {
        self.free_list.len() as u16
    }

    /// Pause check after the free count went down
    pub(crate) fn after_draw(&mut self) -> Option<FlowSignal> {
        if self.status == PoolStatus::ActiveUnpaused && self.available() <= self.thresholds.stop {
            self.status = PoolStatus::ActivePaused;
            return self.member_flow.map(FlowSignal::pause);
        }
        None
    }

    /// Resume check after the free count went up
    pub(crate) fn after_refill(&mut self) -> Option<FlowSignal> {
        if self.status == PoolStatus::ActivePaused && self.available() > self.thresholds.start {
            self.status = PoolStatus::ActiveUnpaused;
            return self.member_flow.map(FlowSignal::resume);
        }
        None
    }

    /// Both checks, for changes that may move occupancy either way
    pub(crate) fn reevaluate(&mut self) -> Option<FlowSignal> {
        self.after_draw().or_else(|| self.after_refill())
    }

    /// Pop up to `count` free descriptors without touching capacity
    pub(crate) fn drain_free(&mut self, count: usize) -> Vec<DescriptorId> {
        let count = count.min(self.free_list.len());
        let split = self.free_list.len() - count;
        self.free_list.split_off(split)
    }

    /// Take descriptors from `batch` up to the current deficiency
    pub(crate) fn absorb(&mut self, batch: &mut Vec<DescriptorId>) -> (usize, Option<FlowSignal>) {
        if !self.status.is_active() || self.deficient == 0 || batch.is_empty() {
            return (0, None);
        }
        let count = (self.deficient as usize).min(batch.len());
        let split = batch.len() - count;
        self.free_list.extend(batch.drain(split..));
        self.deficient -= count as u16;
        debug_assert!(self.is_consistent(), "{:?}", self);
        (count, self.after_refill())
    }

    /// Locked half of deletion: settle the final status and empty the free-list
    pub(crate) fn begin_delete(&mut self, force: bool) -> DeleteOutcome {
        let was_invalid = self.status == PoolStatus::Invalid;
        self.status = if self.in_flight == 0 || force {
            PoolStatus::Inactive
        } else {
            PoolStatus::Invalid
        };

        let drained = std::mem::take(&mut self.free_list);
        // Whatever is still leased is all this pool is owed from now on
        self.capacity = self.in_flight;
        self.deficient = 0;
        self.surplus = 0;
        if self.status == PoolStatus::Invalid {
            self.pool_id = None;
        }
        debug_assert!(self.is_consistent(), "{:?}", self);

        DeleteOutcome {
            status: self.status,
            was_invalid,
            drained,
        }
    }

    pub(crate) fn is_consistent(&self) -> bool {
        u32::from(self.available()) + u32::from(self.in_flight) + u32::from(self.deficient)
            == u32::from(self.capacity) + u32::from(self.surplus)
    }
}

/// A bounded per-flow descriptor reservoir
pub struct FlowPool {
    serial: u64,
    state: Mutex<PoolState>,
    ref_count: AtomicUsize,
}

impl FlowPool {
    pub(crate) fn new(
        serial: u64,
        pool_id: PoolId,
        capacity: u16,
        thresholds: Thresholds,
        descriptors: Vec<DescriptorId>,
    ) -> Self {
        let available = descriptors.len() as u16;
        Self {
            serial,
            state: Mutex::new(PoolState {
                pool_id: Some(pool_id),
                member_flow: None,
                status: PoolStatus::ActiveUnpaused,
                free_list: descriptors,
                capacity,
                deficient: capacity - available,
                in_flight: 0,
                surplus: 0,
                thresholds,
                pkt_drop_no_desc: 0,
            }),
            ref_count: AtomicUsize::new(1),
        }
    }

    /// Lock this pool on its own. Callers holding the registry lock go
    /// through [`RegistryGuard::lock_pool`](super::registry::RegistryGuard::lock_pool) instead.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock()
    }

    /// Creation-order serial, stable for the pool's whole life
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Firmware pool id; `None` once the pool has been invalidated
    pub fn pool_id(&self) -> Option<PoolId> {
        self.lock().pool_id
    }

    pub fn status(&self) -> PoolStatus {
        self.lock().status
    }

    pub fn member_flow(&self) -> Option<FlowId> {
        self.lock().member_flow
    }

    pub fn capacity(&self) -> u16 {
        self.lock().capacity
    }

    pub fn available(&self) -> u16 {
        self.lock().available()
    }

    pub fn deficient(&self) -> u16 {
        self.lock().deficient
    }

    pub fn in_flight(&self) -> u16 {
        self.lock().in_flight
    }

    pub fn thresholds(&self) -> Thresholds {
        self.lock().thresholds
    }

    pub fn reference_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Copy every field under the pool lock
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            serial: self.serial,
            pool_id: state.pool_id,
            member_flow: state.member_flow,
            status: state.status,
            capacity: state.capacity,
            available: state.available(),
            deficient: state.deficient,
            in_flight: state.in_flight,
            surplus: state.surplus,
            thresholds: state.thresholds,
            reference_count: self.reference_count(),
            pkt_drop_no_desc: state.pkt_drop_no_desc,
        }
    }

    /// Draw one descriptor. `None` means the pool is empty or no longer active.
    pub(crate) fn acquire(&self) -> (Option<DescriptorId>, Option<FlowSignal>) {
        let mut state = self.lock();
        if !state.status.is_active() {
            state.pkt_drop_no_desc += 1;
            return (None, None);
        }
        match state.free_list.pop() {
            Some(descriptor) => {
                state.in_flight += 1;
                let signal = state.after_draw();
                (Some(descriptor), signal)
            }
            None => {
                state.pkt_drop_no_desc += 1;
                (None, None)
            }
        }
    }

    /// Return a leased descriptor
    pub(crate) fn release(&self, descriptor: DescriptorId) -> Result<ReleaseOutcome> {
        let mut state = self.lock();
        if state.in_flight == 0 {
            return Err(FlowPoolError::foreign_descriptor(descriptor, self.to_string()));
        }
        state.in_flight -= 1;

        let mut outcome = ReleaseOutcome::default();
        match state.status {
            PoolStatus::Inactive => {
                state.capacity -= 1;
                outcome.shed = Some(descriptor);
            }
            _ if state.surplus > 0 => {
                state.surplus -= 1;
                outcome.shed = Some(descriptor);
            }
            PoolStatus::Invalid => {
                state.free_list.push(descriptor);
                outcome.reclaim = state.in_flight == 0;
            }
            _ => {
                state.free_list.push(descriptor);
                outcome.signal = state.after_refill();
            }
        }
        debug_assert!(state.is_consistent(), "{:?}", *state);
        Ok(outcome)
    }

    /// Take a reference on a live pool
    pub(crate) fn retain(&self) -> Result<usize> {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count + 1)
            })
            .map(|previous| previous + 1)
            .map_err(|_| FlowPoolError::pool_released(self.to_string()))
    }

    /// Re-arm the count of a pool that is being parked as invalid
    pub(crate) fn revive(&self) -> bool {
        self.ref_count
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop a reference; `true` for the single caller that hit zero
    pub(crate) fn drop_ref(&self) -> Result<bool> {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .map(|previous| previous == 1)
            .map_err(|_| FlowPoolError::reference_underflow(self.to_string()))
    }
}

impl fmt::Display for FlowPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.serial)
    }
}

impl fmt::Debug for FlowPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowPool")
            .field("serial", &self.serial)
            .field("ref_count", &self.reference_count())
            .finish_non_exhaustive()
    }
}

/// Copy of a pool's fields taken under its lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub serial: u64,
    pub pool_id: Option<PoolId>,
    pub member_flow: Option<FlowId>,
    pub status: PoolStatus,
    pub capacity: u16,
    pub available: u16,
    pub deficient: u16,
    pub in_flight: u16,
    pub surplus: u16,
    pub thresholds: Thresholds,
    pub reference_count: usize,
    pub pkt_drop_no_desc: u64,
}

impl PoolSnapshot {
    /// Free + leased + missing equals what the pool is owed
    pub fn is_consistent(&self) -> bool {
        u32::from(self.available) + u32::from(self.in_flight) + u32::from(self.deficient)
            == u32::from(self.capacity) + u32::from(self.surplus)
    }
}

impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .pool_id
            .map_or_else(|| "--".to_string(), |id| id.to_string());
        let flow = self
            .member_flow
            .map_or_else(|| "--".to_string(), |flow| flow.to_string());
        write!(
            f,
            "pool#{} id {} status {} :: total {} available {} deficient {} in-flight {} :: start {} stop {} :: flow {} refs {} drops {}",
            self.serial,
            id,
            self.status,
            self.capacity,
            self.available,
            self.deficient,
            self.in_flight,
            self.thresholds.start,
            self.thresholds.stop,
            flow,
            self.reference_count,
            self.pkt_drop_no_desc,
        )
    }
}
