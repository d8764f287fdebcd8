//! # txflow - Flow-Controlled Transmit Descriptor Pools
//!
//! txflow partitions a fixed slab of transmit descriptors into per-flow
//! pools so that one busy flow cannot starve the others. Each pool pauses its
//! flow when free descriptors run low and resumes it once enough come back.
//!
//! ## Features
//!
//! - **Per-flow pools**: bounded reservoirs carved out of a global slab
//! - **Watermark backpressure**: pause/resume signals on threshold crossings
//! - **Staged deletion**: pools deleted with descriptors in flight are parked
//!   and reclaimed when the last one completes
//! - **Redistribution**: freed descriptors top up pools created short
//! - **Firmware events**: map, unmap and resize handlers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              FlowPoolManager                    │
//! ├─────────────────────────────────────────────────┤
//! │  PoolRegistry (ordered)  │  Flow map            │
//! │  - FlowPool  (flow 1)    │  - flow id -> pool   │
//! │  - FlowPool  (flow 2)    │  Stats / diagnostics │
//! └─────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────┐    ┌─────────────────────────┐
//! │ DescriptorSlab  │    │   FlowControlSink       │
//! │ (global supply) │    │   (pause / resume)      │
//! └─────────────────┘    └─────────────────────────┘
//! ```

pub mod descriptors;
pub mod error;
pub mod flow_pools;

pub use descriptors::{DescriptorId, DescriptorSlab, DescriptorSource, SlabStats, TxDescriptor};
pub use error::{FlowPoolError, Result};
pub use flow_pools::{
    FlowAction, FlowControlConfig, FlowControlConfigBuilder, FlowControlSink, FlowId, FlowPool,
    FlowPoolDiagnostics, FlowPoolManager, FlowPoolStats, FlowPoolStatsSnapshot, FlowReason,
    FlowSignal, FlowType, InvalidPoolOverflow, NullSink, PoolHandle, PoolId, PoolRegistry,
    PoolSnapshot, PoolStatus, RecordingSink, Thresholds,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    pub use crate::flow_pools::config::{
        DEFAULT_START_QUEUE_OFFSET_PCT, DEFAULT_STOP_QUEUE_THRESHOLD_PCT, MAX_INVALID_POOLS,
    };
    pub use crate::flow_pools::{INVALID_POOL_ID, MGMT_POOL_ID, MGMT_POOL_SIZE};
}
