//! Process-wide runtime state.
//!
//! Everything shared between services (logging, metrics, the diagnostic
//! sink) is created in [`Runtime::init`] and torn down in
//! [`Runtime::shutdown`]; nothing is initialized lazily on first use.

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::service::{ServiceBuilder, ServiceHandle, ServiceKind};
use crate::utils::logging::{init_logging, DiagnosticSink, TracingSink};
use crate::utils::metrics::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn, Level};

/// How long `shutdown` waits for each service when dropped.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Runtime {
    config: RuntimeConfig,
    metrics: Arc<Metrics>,
    sink: Arc<dyn DiagnosticSink>,
    services: Arc<Mutex<Vec<ServiceHandle>>>,
    logging_installed: bool,
    shut_down: AtomicBool,
}

impl Runtime {
    /// Validate `config`, install logging and create the shared state.
    pub fn init(config: RuntimeConfig) -> Result<Self> {
        config.validate_strict()?;
        let logging_installed = init_logging(&config.logging)?;
        info!(
            app = %config.logging.app_name,
            fps = config.service.fps,
            tick_budget = config.service.tick_budget,
            "Runtime initialized"
        );
        Ok(Self {
            config,
            metrics: Arc::new(Metrics::new()),
            sink: Arc::new(TracingSink),
            services: Arc::new(Mutex::new(Vec::new())),
            logging_installed,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Replace the diagnostic sink handed to services created afterwards.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn sink(&self) -> Arc<dyn DiagnosticSink> {
        Arc::clone(&self.sink)
    }

    /// Whether this runtime installed the global subscriber.
    pub fn logging_installed(&self) -> bool {
        self.logging_installed
    }

    /// Builder for a service that inherits this runtime's configuration and
    /// is stopped by [`shutdown`](Self::shutdown).
    pub fn service(&self, name: impl Into<String>, kind: ServiceKind) -> ServiceBuilder {
        let services = Arc::clone(&self.services);
        ServiceBuilder::new(name)
            .kind(kind)
            .config(self.config.service.clone())
            .stack_config(self.config.stack.clone())
            .sink(Arc::clone(&self.sink))
            .metrics(Arc::clone(&self.metrics))
            .on_build(move |handle| {
                services
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(handle.clone());
            })
    }

    /// Handles of every service created through this runtime, in creation
    /// order.
    pub fn services(&self) -> Vec<ServiceHandle> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop every service in reverse creation order, waiting up to `timeout`
    /// for each. Returns how many failed to stop in time. Later calls do
    /// nothing.
    pub fn shutdown(&self, timeout: Duration) -> usize {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let services = self.services();
        let mut stuck = 0;
        for handle in services.iter().rev() {
            handle.request_stop();
            if !handle.wait_stopped(timeout) {
                stuck += 1;
                self.sink.write_line(
                    Level::WARN,
                    handle.name(),
                    &format!("did not stop within {timeout:?}"),
                );
            }
        }

        if stuck > 0 {
            warn!(stuck, "Runtime shut down with services still running");
        }
        self.metrics.log_metrics("runtime");
        info!(services = services.len(), "Runtime shut down");
        stuck
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    }
}
