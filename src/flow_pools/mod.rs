//! Per-flow transmit descriptor pools
//!
//! Each flow (one per interface) sends from its own bounded pool carved out
//! of the global descriptor slab. Pools pause their flow when occupancy runs
//! low, resume it once descriptors come back, and hand free descriptors to
//! pools that were created short when they go away.

pub mod config;
pub mod control;
pub mod handlers;
mod lifecycle;
pub mod manager;
pub mod pool;
mod redistribute;
pub mod registry;
pub mod stats;

pub use config::{FlowControlConfig, FlowControlConfigBuilder, InvalidPoolOverflow};
pub use control::{FlowAction, FlowControlSink, FlowReason, FlowSignal, NullSink, RecordingSink, SignalDispatcher};
pub use handlers::FlowType;
pub use manager::FlowPoolManager;
pub use pool::{FlowId, FlowPool, PoolHandle, PoolId, PoolSnapshot, PoolStatus, Thresholds};
pub use registry::{PoolRegistry, RegistryGuard};
pub use stats::{FlowPoolDiagnostics, FlowPoolStats, FlowPoolStatsSnapshot};

/// Pool id carried by invalidated pools; never accepted from firmware
pub const INVALID_POOL_ID: PoolId = 0xFF;

/// Id of the shared management-frame pool
pub const MGMT_POOL_ID: PoolId = 0xEF;

/// Descriptors reserved for management frames
pub const MGMT_POOL_SIZE: u16 = 32;
