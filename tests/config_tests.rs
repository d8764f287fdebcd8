//! Tests for loading flow control configuration from disk

#[cfg(test)]
mod tests {
    use std::{io::Write, sync::Arc};

    use tempfile::{NamedTempFile, TempDir};
    use txflow::{
        DescriptorSlab, FlowControlConfig, FlowPoolError, FlowPoolManager, InvalidPoolOverflow,
        NullSink,
    };

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
stop_queue_threshold_pct = 20
start_queue_offset_pct = 5
max_invalid_pools = 8
invalid_overflow = "report"
global_mgmt_pool = true
"#,
        );

        let config = FlowControlConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stop_queue_threshold_pct, 20);
        assert_eq!(config.start_queue_offset_pct, 5);
        assert_eq!(config.max_invalid_pools, 8);
        assert_eq!(config.invalid_overflow, InvalidPoolOverflow::Report);
        assert!(config.global_mgmt_pool);
        assert_eq!(config.stop_threshold(100), 20);
        assert_eq!(config.start_threshold(100), 25);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = write_config("");
        let config = FlowControlConfig::from_file(file.path()).unwrap();
        assert_eq!(config, FlowControlConfig::default());
    }

    #[test]
    fn test_loaded_config_drives_thresholds() {
        let file = write_config("stop_queue_threshold_pct = 50\nstart_queue_offset_pct = 25\n");
        let config = FlowControlConfig::from_file(file.path()).unwrap();
        let manager =
            FlowPoolManager::new(config, Arc::new(DescriptorSlab::new(40)), Arc::new(NullSink)).unwrap();

        let pool = manager.create_pool(1, 40).unwrap();
        let thresholds = pool.thresholds();
        assert_eq!(thresholds.stop, 20);
        assert_eq!(thresholds.start, 30);
    }

    #[test]
    fn test_out_of_range_percentages_rejected() {
        let file = write_config("stop_queue_threshold_pct = 90\nstart_queue_offset_pct = 20\n");
        let err = FlowControlConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, FlowPoolError::InvalidParameter { .. }));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let file = write_config("stop_queue_threshold_pct = \"lots\"\n");
        let err = FlowControlConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, FlowPoolError::Config { source: Some(_), .. }));
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = FlowControlConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, FlowPoolError::Io { source: Some(_), .. }));
    }
}
