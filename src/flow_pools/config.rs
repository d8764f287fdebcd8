//! Flow control configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowPoolError, Result};

/// Default stop-queue threshold, percent of pool capacity
pub const DEFAULT_STOP_QUEUE_THRESHOLD_PCT: u8 = 15;

/// Default distance between stop and start thresholds, percent of capacity
pub const DEFAULT_START_QUEUE_OFFSET_PCT: u8 = 10;

/// Pools allowed to wait for outstanding descriptors at the same time
pub const MAX_INVALID_POOLS: usize = 3;

/// What to do when more pools are stuck invalid than `max_invalid_pools`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPoolOverflow {
    /// Treat the overflow as descriptor leakage and abort
    Panic,
    /// Log loudly and return [`FlowPoolError::InvalidPoolLimit`]
    Report,
}

impl Default for InvalidPoolOverflow {
    fn default() -> Self {
        Self::Panic
    }
}

/// Configuration for the flow pool manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    /// Queue is paused once free descriptors drop to this share of capacity
    pub stop_queue_threshold_pct: u8,
    /// Queue resumes once free descriptors exceed stop + offset
    pub start_queue_offset_pct: u8,
    /// Bound on concurrently invalid pools
    pub max_invalid_pools: usize,
    /// Policy applied when the bound is exceeded
    pub invalid_overflow: InvalidPoolOverflow,
    /// Create the shared management-frame pool at bring-up
    pub global_mgmt_pool: bool,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            stop_queue_threshold_pct: DEFAULT_STOP_QUEUE_THRESHOLD_PCT,
            start_queue_offset_pct: DEFAULT_START_QUEUE_OFFSET_PCT,
            max_invalid_pools: MAX_INVALID_POOLS,
            invalid_overflow: InvalidPoolOverflow::default(),
            global_mgmt_pool: false,
        }
    }
}

impl FlowControlConfig {
    /// Create a configuration with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stop threshold percentage
    pub fn with_stop_threshold(mut self, pct: u8) -> Self {
        self.stop_queue_threshold_pct = pct;
        self
    }

    /// Set start offset percentage
    pub fn with_start_offset(mut self, pct: u8) -> Self {
        self.start_queue_offset_pct = pct;
        self
    }

    /// Set the invalid pool bound
    pub fn with_max_invalid_pools(mut self, max: usize) -> Self {
        self.max_invalid_pools = max;
        self
    }

    /// Set the invalid pool overflow policy
    pub fn with_invalid_overflow(mut self, policy: InvalidPoolOverflow) -> Self {
        self.invalid_overflow = policy;
        self
    }

    /// Enable or disable the management pool
    pub fn with_global_mgmt_pool(mut self, enable: bool) -> Self {
        self.global_mgmt_pool = enable;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.stop_queue_threshold_pct > 100 {
            return Err(FlowPoolError::invalid_parameter(
                "stop_queue_threshold_pct",
                "Stop threshold cannot exceed 100%",
            ));
        }

        if u16::from(self.stop_queue_threshold_pct) + u16::from(self.start_queue_offset_pct) > 100 {
            return Err(FlowPoolError::invalid_parameter(
                "start_queue_offset_pct",
                "Stop threshold plus start offset cannot exceed 100%",
            ));
        }

        Ok(())
    }

    /// Stop threshold in descriptors for a pool of `capacity`
    pub fn stop_threshold(&self, capacity: u16) -> u16 {
        Self::percent_of(self.stop_queue_threshold_pct.into(), capacity)
    }

    /// Start threshold in descriptors for a pool of `capacity`
    pub fn start_threshold(&self, capacity: u16) -> u16 {
        let pct = u32::from(self.stop_queue_threshold_pct) + u32::from(self.start_queue_offset_pct);
        Self::percent_of(pct, capacity)
    }

    fn percent_of(pct: u32, capacity: u16) -> u16 {
        // pct is validated to be <= 100, so the result fits
        (pct * u32::from(capacity) / 100) as u16
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Builder pattern for flow control configuration
pub struct FlowControlConfigBuilder {
    config: FlowControlConfig,
}

impl FlowControlConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: FlowControlConfig::default(),
        }
    }

    /// Set stop threshold percentage
    pub fn stop_threshold(mut self, pct: u8) -> Self {
        self.config.stop_queue_threshold_pct = pct;
        self
    }

    /// Set start offset percentage
    pub fn start_offset(mut self, pct: u8) -> Self {
        self.config.start_queue_offset_pct = pct;
        self
    }

    /// Set the invalid pool bound
    pub fn max_invalid_pools(mut self, max: usize) -> Self {
        self.config.max_invalid_pools = max;
        self
    }

    /// Report invalid pool overflow as an error instead of aborting
    pub fn report_invalid_overflow(mut self) -> Self {
        self.config.invalid_overflow = InvalidPoolOverflow::Report;
        self
    }

    /// Create the management pool at bring-up
    pub fn global_mgmt_pool(mut self, enable: bool) -> Self {
        self.config.global_mgmt_pool = enable;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<FlowControlConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for FlowControlConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_from_percentages() {
        let config = FlowControlConfig::default();
        assert_eq!(config.stop_threshold(10), 1);
        assert_eq!(config.start_threshold(10), 2);
        assert_eq!(config.stop_threshold(200), 30);
        assert_eq!(config.start_threshold(200), 50);
        assert_eq!(config.stop_threshold(0), 0);
    }

    #[test]
    fn test_validation_rejects_overlapping_percentages() {
        assert!(FlowControlConfig::new().with_stop_threshold(101).validate().is_err());
        assert!(FlowControlConfig::new()
            .with_stop_threshold(60)
            .with_start_offset(50)
            .validate()
            .is_err());
        assert!(FlowControlConfigBuilder::new()
            .stop_threshold(50)
            .start_offset(50)
            .build()
            .is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = FlowControlConfig::from_toml_str(
            "stop_queue_threshold_pct = 20\ninvalid_overflow = \"report\"\n",
        )
        .unwrap();
        assert_eq!(config.stop_queue_threshold_pct, 20);
        assert_eq!(config.start_queue_offset_pct, DEFAULT_START_QUEUE_OFFSET_PCT);
        assert_eq!(config.invalid_overflow, InvalidPoolOverflow::Report);
    }
}
