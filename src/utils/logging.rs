//! Logging setup and the diagnostic sink used by services.
//!
//! Services report through a [`DiagnosticSink`]. The default [`TracingSink`]
//! forwards lines to `tracing` once a global subscriber exists; before that
//! (or when none is ever installed) it writes straight to standard error
//! without creating any logger state.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Receiver for human-readable diagnostic lines.
pub trait DiagnosticSink: Send + Sync {
    fn write_line(&self, level: Level, tag: &str, message: &str);
}

/// Sink that prefers `tracing` and falls back to raw stderr writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn write_line(&self, level: Level, tag: &str, message: &str) {
        if !tracing::dispatcher::has_been_set() {
            write_uninitialized(level, tag, message);
            return;
        }
        if level == Level::ERROR {
            tracing::error!(tag, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(tag, "{message}");
        } else if level == Level::INFO {
            tracing::info!(tag, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(tag, "{message}");
        } else {
            tracing::trace!(tag, "{message}");
        }
    }
}

/// Direct stderr output for when no subscriber is installed.
fn write_uninitialized(level: Level, tag: &str, message: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "[{level}] [{tag}] {message}");
}

/// Install the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` overrides the configured level. Returns `Ok(false)` if a global
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.log_to_console {
        let layer = fmt::layer().with_writer(std::io::stderr);
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    if config.log_to_file {
        let path = config
            .log_file_path
            .as_deref()
            .ok_or_else(|| Error::Config("log_file_path is required for file logging".into()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Config(format!("Failed to open log file '{path}': {e}")))?;
        let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }

    let subscriber = Registry::default().with(layers).with(filter);
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => {
            tracing::info!(app = %config.app_name, "Logging initialized");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Collect(Mutex<Vec<String>>);

    impl DiagnosticSink for Collect {
        fn write_line(&self, level: Level, tag: &str, message: &str) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(format!("{level} {tag} {message}"));
            }
        }
    }

    #[test]
    fn test_sink_is_object_safe() {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(Collect(Mutex::new(Vec::new())));
        sink.write_line(Level::WARN, "svc", "hello");
        let tracing_sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);
        tracing_sink.write_line(Level::DEBUG, "svc", "fallback path");
    }
}
