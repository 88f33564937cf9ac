//! # Configuration Management
//!
//! Centralized configuration for services, protocol stacks and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Example
//! ```rust
//! use service_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml(r#"
//!     [service]
//!     fps = 30
//!
//!     [stack]
//!     compression = "lz4"
//! "#).unwrap();
//! assert_eq!(config.service.fps, 30);
//! assert!(config.validate().is_empty());
//! ```

use crate::core::stream::Endian;
use crate::error::{Error, Result};
use crate::utils::compression::CompressionKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::Level;

/// Update rate meaning "tick as fast as possible".
pub const INFINITE_FPS: u32 = u32::MAX;

/// Lowest finite update rate.
pub const MIN_FPS: u32 = 1;

/// Highest finite update rate.
pub const MAX_FPS: u32 = 1000;

/// Default number of inbound blocks drained per tick.
pub const DEFAULT_TICK_BUDGET: usize = 256;

/// Max allowed frame body size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Marker at the start of every frame ("SR")
pub const FRAME_MAGIC: u16 = 0x5352;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RuntimeConfig {
    /// Defaults applied to every service
    #[serde(default)]
    pub service: ServiceConfig,

    /// Protocol stack layout
    #[serde(default)]
    pub stack: StackConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| Error::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `SERVICE_RUNTIME_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(fps) = std::env::var("SERVICE_RUNTIME_FPS") {
            if fps.eq_ignore_ascii_case("infinite") {
                self.service.fps = INFINITE_FPS;
            } else if let Ok(val) = fps.parse::<u32>() {
                self.service.fps = val;
            }
        }

        if let Ok(budget) = std::env::var("SERVICE_RUNTIME_TICK_BUDGET") {
            if let Ok(val) = budget.parse::<usize>() {
                self.service.tick_budget = val;
            }
        }

        if let Ok(capacity) = std::env::var("SERVICE_RUNTIME_SAMPLER_CAPACITY") {
            if let Ok(val) = capacity.parse::<usize>() {
                self.service.sampler_enabled = val > 0;
                self.service.sampler_capacity = val;
            }
        }

        if let Ok(level) = std::env::var("SERVICE_RUNTIME_LOG_LEVEL") {
            if let Ok(val) = level.parse::<Level>() {
                self.logging.log_level = val;
            }
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration; an empty list means it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.service.validate());
        errors.extend(self.stack.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Per-service scheduling and queue settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Maximum ticks per second, or `INFINITE_FPS`
    pub fps: u32,

    /// Maximum inbound blocks drained per tick
    pub tick_budget: usize,

    /// Whether inbound/outbound traffic is mirrored onto the sampler queue
    pub sampler_enabled: bool,

    /// Capacity of the sampler queue; copies beyond it are dropped
    pub sampler_capacity: usize,

    /// Bytes a single connection may buffer while waiting for a full frame
    pub max_session_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fps: INFINITE_FPS,
            tick_budget: DEFAULT_TICK_BUDGET,
            sampler_enabled: false,
            sampler_capacity: 1024,
            max_session_buffer: 2 * MAX_FRAME_SIZE,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.fps != INFINITE_FPS && !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            errors.push(format!(
                "Invalid fps: {} (valid range: {MIN_FPS}-{MAX_FPS} or infinite)",
                self.fps
            ));
        }

        if self.tick_budget == 0 {
            errors.push("Tick budget must be greater than 0".to_string());
        } else if self.tick_budget > 1_000_000 {
            errors.push(format!(
                "Tick budget too large: {} (max recommended: 1,000,000)",
                self.tick_budget
            ));
        }

        if self.sampler_enabled && self.sampler_capacity == 0 {
            errors.push("Sampler capacity must be greater than 0 when enabled".to_string());
        }

        if self.max_session_buffer == 0 {
            errors.push("Max session buffer must be greater than 0".to_string());
        }

        errors
    }
}

/// Protocol stack layout
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StackConfig {
    /// Wrap packets in length-prefixed frames
    pub framing: bool,

    /// Maximum frame body size in bytes
    pub max_frame_size: usize,

    /// Compression algorithm (`none`, `lz4`, `zstd`)
    pub compression: CompressionKind,

    /// Payloads smaller than this bypass compression
    pub compression_threshold_bytes: usize,

    /// Add per-connection sequence numbers
    pub sequence: bool,

    /// Byte order of payload streams handed to facades
    pub default_endian: Endian,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            framing: true,
            max_frame_size: MAX_FRAME_SIZE,
            compression: CompressionKind::None,
            compression_threshold_bytes: 512,
            sequence: false,
            default_endian: Endian::NETWORK,
        }
    }
}

impl StackConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size == 0 {
            errors.push("Max frame size cannot be 0".to_string());
        } else if self.max_frame_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_frame_size
            ));
        }

        if self.compression != CompressionKind::None
            && self.compression_threshold_bytes > self.max_frame_size
        {
            errors.push("Compression threshold cannot be larger than max frame size".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("service-runtime"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            match self.log_file_path {
                Some(ref path) => {
                    if let Some(parent) = Path::new(path).parent() {
                        if !parent.as_os_str().is_empty() && !parent.exists() {
                            errors.push(format!(
                                "Log file directory does not exist: {}",
                                parent.display()
                            ));
                        }
                    }
                }
                None => errors
                    .push("log_file_path must be specified when log_to_file is true".to_string()),
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
