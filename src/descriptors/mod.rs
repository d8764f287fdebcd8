//! Transmit descriptors and the global slab that mints them
//!
//! Descriptors are plain indices into a fixed slot table. Flow pools hold
//! free indices on their own free-lists; the send path holds them as
//! [`TxDescriptor`] leases that remember which pool they came from.

pub mod descriptor;
pub mod slab;

pub use descriptor::{DescriptorId, TxDescriptor};
pub use slab::{DescriptorSlab, DescriptorSource, SlabStats};
