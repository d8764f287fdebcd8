//! Error types and handling for txflow

use crate::descriptors::DescriptorId;
use crate::flow_pools::PoolId;

/// Result type alias for txflow operations
pub type Result<T> = std::result::Result<T, FlowPoolError>;

/// Caller-visible failures of the flow pool core.
///
/// Running out of descriptors is deliberately absent: acquisition reports
/// exhaustion as `None` so the send path can treat it as backpressure.
#[derive(Debug, thiserror::Error)]
pub enum FlowPoolError {
    /// No live pool carries the requested identifier
    #[error("Flow pool not found: {pool_id}")]
    PoolNotFound { pool_id: PoolId },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Firmware asked for a flow type this core does not handle
    #[error("Unsupported flow type: {flow_type}")]
    UnsupportedFlowType { flow_type: u8 },

    /// The device context has been brought down
    #[error("Flow control context has been shut down")]
    ContextShutdown,

    /// A decrement was attempted on a pool with no references left
    #[error("Reference count underflow on pool {pool}")]
    ReferenceUnderflow { pool: String },

    /// A reference was requested on a pool that has already been released
    #[error("Pool {pool} has already been released")]
    PoolReleased { pool: String },

    /// Too many pools are waiting for outstanding descriptors
    #[error("Invalid pool limit exceeded: {count} pools pending reclaim, limit {limit}")]
    InvalidPoolLimit { count: usize, limit: usize },

    /// A descriptor was returned through a pool that does not own it
    #[error("Descriptor {descriptor} is not owned by pool {pool}")]
    ForeignDescriptor { descriptor: DescriptorId, pool: String },

    /// I/O failure while reading configuration
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration could not be parsed
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },
}

impl FlowPoolError {
    /// Create a pool not found error
    pub fn pool_not_found(pool_id: PoolId) -> Self {
        Self::PoolNotFound { pool_id }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported flow type error
    pub fn unsupported_flow_type(flow_type: u8) -> Self {
        Self::UnsupportedFlowType { flow_type }
    }

    /// Create a reference underflow error
    pub fn reference_underflow(pool: impl Into<String>) -> Self {
        Self::ReferenceUnderflow { pool: pool.into() }
    }

    /// Create a pool released error
    pub fn pool_released(pool: impl Into<String>) -> Self {
        Self::PoolReleased { pool: pool.into() }
    }

    /// Create an invalid pool limit error
    pub fn invalid_pool_limit(count: usize, limit: usize) -> Self {
        Self::InvalidPoolLimit { count, limit }
    }

    /// Create a foreign descriptor error
    pub fn foreign_descriptor(descriptor: DescriptorId, pool: impl Into<String>) -> Self {
        Self::ForeignDescriptor {
            descriptor,
            pool: pool.into(),
        }
    }

    /// Create a configuration error without an underlying cause
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the error reflects a programming or lifecycle fault rather than bad input
    pub fn is_lifecycle_fault(&self) -> bool {
        matches!(
            self,
            Self::ReferenceUnderflow { .. }
                | Self::PoolReleased { .. }
                | Self::InvalidPoolLimit { .. }
                | Self::ForeignDescriptor { .. }
        )
    }
}

impl From<std::io::Error> for FlowPoolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<toml::de::Error> for FlowPoolError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}
