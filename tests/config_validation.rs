//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use service_runtime::config::{
    LoggingConfig, RuntimeConfig, ServiceConfig, StackConfig, INFINITE_FPS, MAX_FPS,
};
use service_runtime::core::stream::Endian;
use service_runtime::error::ErrorKind;
use service_runtime::utils::compression::CompressionKind;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = RuntimeConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.service.fps, INFINITE_FPS);
    assert_eq!(config.stack.default_endian, Endian::Big);
}

#[test]
fn test_zero_fps_rejected() {
    let mut config = RuntimeConfig::default();
    config.service.fps = 0;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("Invalid fps")));
}

#[test]
fn test_fps_above_maximum_rejected() {
    let mut config = ServiceConfig::default();
    config.fps = MAX_FPS + 1;
    assert!(config.validate().iter().any(|e| e.contains("Invalid fps")));

    config.fps = MAX_FPS;
    assert!(config.validate().is_empty());
}

#[test]
fn test_zero_tick_budget() {
    let mut config = RuntimeConfig::default();
    config.service.tick_budget = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Tick budget must be greater than 0")));
}

#[test]
fn test_excessive_tick_budget() {
    let mut config = RuntimeConfig::default();
    config.service.tick_budget = 2_000_000;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Tick budget too large")));
}

#[test]
fn test_enabled_sampler_needs_capacity() {
    let mut config = ServiceConfig::default();
    config.sampler_enabled = true;
    config.sampler_capacity = 0;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Sampler capacity")));

    // A disabled sampler ignores its capacity.
    config.sampler_enabled = false;
    assert!(config.validate().is_empty());
}

#[test]
fn test_zero_session_buffer() {
    let mut config = ServiceConfig::default();
    config.max_session_buffer = 0;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max session buffer")));
}

#[test]
fn test_zero_frame_size() {
    let mut config = StackConfig::default();
    config.max_frame_size = 0;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max frame size cannot be 0")));
}

#[test]
fn test_oversized_frame_limit() {
    let mut config = StackConfig::default();
    config.max_frame_size = 200 * 1024 * 1024;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max frame size too large")));
}

#[test]
fn test_compression_threshold_above_frame_size() {
    let mut config = StackConfig::default();
    config.compression = CompressionKind::Lz4;
    config.max_frame_size = 1024;
    config.compression_threshold_bytes = 4096;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Compression threshold cannot be larger")));

    // Without compression the threshold is irrelevant.
    config.compression = CompressionKind::None;
    assert!(config.validate().is_empty());
}

#[test]
fn test_empty_app_name() {
    let mut config = LoggingConfig::default();
    config.app_name = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_long_app_name() {
    let mut config = LoggingConfig::default();
    config.app_name = "a".repeat(100);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Application name too long")));
}

#[test]
fn test_log_file_without_path() {
    let mut config = LoggingConfig::default();
    config.log_to_file = true;
    config.log_file_path = None;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_log_file_missing_directory() {
    let mut config = LoggingConfig::default();
    config.log_to_file = true;
    config.log_file_path = Some("/definitely/not/a/real/dir/runtime.log".to_string());

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Log file directory does not exist")));
}

#[test]
fn test_no_logging_output() {
    let mut config = LoggingConfig::default();
    config.log_to_console = false;
    config.log_to_file = false;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_multiple_errors_collected() {
    let mut config = RuntimeConfig::default();
    config.service.fps = 0;
    config.stack.max_frame_size = 0;
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(errors.len() >= 3, "expected three errors, got {errors:?}");
}

#[test]
fn test_validate_strict_returns_config_error() {
    let config = RuntimeConfig::default_with_overrides(|c| c.service.tick_budget = 0);
    let err = config.validate_strict().expect_err("tick budget 0 is invalid");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_toml_parsing() {
    let config = RuntimeConfig::from_toml(
        r#"
        [service]
        fps = 60
        tick_budget = 32
        sampler_enabled = true
        sampler_capacity = 16

        [stack]
        compression = "zstd"
        sequence = true
        default_endian = "little"

        [logging]
        app_name = "edge"
        log_level = "debug"
    "#,
    )
    .expect("valid TOML");

    assert_eq!(config.service.fps, 60);
    assert_eq!(config.service.tick_budget, 32);
    assert!(config.service.sampler_enabled);
    assert_eq!(config.stack.compression, CompressionKind::Zstd);
    assert!(config.stack.sequence);
    assert_eq!(config.stack.default_endian, Endian::Little);
    assert!(config.stack.framing, "unspecified fields keep defaults");
    assert_eq!(config.logging.app_name, "edge");
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_bad_toml_is_config_error() {
    let err = RuntimeConfig::from_toml("[service]\nfps = \"fast\"").expect_err("fps is a number");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_example_config_round_trips() {
    let text = RuntimeConfig::example_config();
    let parsed = RuntimeConfig::from_toml(&text).expect("example config parses");
    assert!(parsed.validate().is_empty());
    assert_eq!(parsed.service.tick_budget, ServiceConfig::default().tick_budget);
}
