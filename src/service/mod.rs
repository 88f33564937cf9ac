//! # Service Engine
//!
//! A service owns a protocol stack, its inbound/outbound queues and a set of
//! facades, and drives them from a dedicated logic thread at a bounded rate.
//!
//! ## Lifecycle
//! ```text
//! Created -> Starting -> Running -> Stopping -> Stopped
//!                 \_______________________________/
//!                  (a facade declines on_start)
//! ```
//!
//! - Facades and timers may be added only while `Created`; registering
//!   later fails with `InvalidState`.
//! - `start` runs every `on_start` on the logic thread and returns once the
//!   loop is running, or `Ok(false)` if a facade declined.
//! - `stop` is cooperative and idempotent. It returns after the in-flight
//!   tick, every `on_stop` (reverse registration order) and teardown.
//! - A stopped service cannot be restarted.
//!
//! ## Example
//! ```rust,no_run
//! use service_runtime::core::block::SessionId;
//! use service_runtime::core::stream::Stream;
//! use service_runtime::error::Result;
//! use service_runtime::service::{Facade, FacadeEvents, Service, ServiceContext, ServiceKind};
//!
//! struct Echo;
//!
//! impl Facade for Echo {
//!     fn events(&self) -> FacadeEvents {
//!         FacadeEvents::DATA_ARRIVAL
//!     }
//!
//!     fn on_data_arrival(
//!         &mut self,
//!         ctx: &mut ServiceContext<'_>,
//!         session: SessionId,
//!         opcode: u32,
//!         payload: &mut Stream,
//!     ) -> Result<()> {
//!         let reply = Stream::from_slice(payload.unread());
//!         ctx.send(session, opcode, reply)
//!     }
//! }
//!
//! let mut service = Service::create("echo", ServiceKind::Normal);
//! service.register_facade(Echo).unwrap();
//! service.set_fps(60).unwrap();
//! service.start().unwrap();
//! let io = service.handle();
//! io.open_session(SessionId(1)).unwrap();
//! service.stop();
//! ```

pub mod context;
mod engine;
pub mod facade;
pub mod handle;
mod session;
pub mod timer;

pub use context::ServiceContext;
pub use facade::{Facade, FacadeEvents, FacadeId};
pub use handle::ServiceHandle;
pub use timer::TimerId;

use crate::config::{ServiceConfig, StackConfig};
use crate::core::block::MessageBlock;
use crate::core::queue::{MessageQueue, SamplerQueue};
use crate::error::{Error, Result};
use crate::protocol::ProtocolStack;
use crate::utils::logging::{DiagnosticSink, TracingSink};
use crate::utils::metrics::Metrics;
use context::Core;
use engine::Engine;
use handle::Shared;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use timer::TimerQueue;
use tracing::{info, Level};

/// Whether inbound data goes through the protocol stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceKind {
    /// Blocks are decoded into packets by the protocol stack.
    #[default]
    Normal,
    /// Each data block is delivered as one packet with opcode 0 and sent
    /// payloads are written unencoded.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Created = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl ServiceState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ServiceState::Created,
            1 => ServiceState::Starting,
            2 => ServiceState::Running,
            3 => ServiceState::Stopping,
            _ => ServiceState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Created => "created",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configures and creates a [`Service`].
pub struct ServiceBuilder {
    name: String,
    kind: ServiceKind,
    config: ServiceConfig,
    stack: Option<ProtocolStack>,
    stack_config: StackConfig,
    inbound_capacity: Option<usize>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    metrics: Option<Arc<Metrics>>,
    on_build: Option<Box<dyn FnOnce(&ServiceHandle) + Send>>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ServiceKind::Normal,
            config: ServiceConfig::default(),
            stack: None,
            stack_config: StackConfig::default(),
            inbound_capacity: None,
            sink: None,
            metrics: None,
            on_build: None,
        }
    }

    pub fn kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.fps = fps;
        self
    }

    pub fn tick_budget(mut self, budget: usize) -> Self {
        self.config.tick_budget = budget;
        self
    }

    /// Mirror traffic onto a sampler queue holding up to `capacity` copies.
    pub fn sampler(mut self, capacity: usize) -> Self {
        self.config.sampler_enabled = true;
        self.config.sampler_capacity = capacity;
        self
    }

    /// Bound the inbound queue; pushes beyond it fail with a limit error.
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = Some(capacity);
        self
    }

    /// Use a prebuilt stack instead of one built from the stack config.
    pub fn stack(mut self, stack: ProtocolStack) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn stack_config(mut self, config: StackConfig) -> Self {
        self.stack_config = config;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn on_build(mut self, hook: impl FnOnce(&ServiceHandle) + Send + 'static) -> Self {
        self.on_build = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Service> {
        let mut errors = Vec::new();
        if self.name.is_empty() {
            errors.push("Service name cannot be empty".to_string());
        }
        errors.extend(self.config.validate());
        if self.stack.is_none() {
            errors.extend(self.stack_config.validate());
        }
        if self.inbound_capacity == Some(0) {
            errors.push("Inbound capacity must be greater than 0".to_string());
        }
        if !errors.is_empty() {
            return Err(Error::Config(errors.join("; ")));
        }
        Ok(self.assemble())
    }

    fn assemble(self) -> Service {
        let inbound = match self.inbound_capacity {
            Some(capacity) => MessageQueue::bounded(capacity),
            None => MessageQueue::unbounded(),
        };
        let sampler = if self.config.sampler_enabled {
            SamplerQueue::enabled(self.config.sampler_capacity)
        } else {
            SamplerQueue::disabled()
        };
        let shared = Arc::new(Shared::new(
            self.name,
            self.kind,
            self.config.fps,
            inbound,
            sampler,
            self.metrics.unwrap_or_default(),
            self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
        ));

        let stack = self
            .stack
            .unwrap_or_else(|| ProtocolStack::from_config(&self.stack_config));
        let core = Core {
            shared: Arc::clone(&shared),
            stack,
            sessions: HashMap::new(),
            timers: TimerQueue::default(),
            closed: Vec::new(),
            tick_budget: self.config.tick_budget.max(1),
            max_session_buffer: self.config.max_session_buffer,
        };

        let service = Service {
            shared,
            engine: Mutex::new(Some(Engine::new(core))),
            thread: Mutex::new(None),
        };
        if let Some(hook) = self.on_build {
            hook(&service.handle());
        }
        service
    }
}

/// A named update loop with its facades, queues and protocol stack.
///
/// Dropping a running service stops it. `stop` takes `&self`, so a service
/// behind an `Arc` can be stopped from any thread.
pub struct Service {
    shared: Arc<Shared>,
    // Facades are `Send` but not `Sync`; the lock makes the service shareable.
    engine: Mutex<Option<Engine>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    /// A service with default settings: unthrottled, default stack, no
    /// facades.
    pub fn create(name: impl Into<String>, kind: ServiceKind) -> Self {
        ServiceBuilder::new(name).kind(kind).assemble()
    }

    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> ServiceKind {
        self.shared.kind
    }

    pub fn state(&self) -> ServiceState {
        self.shared.state()
    }

    pub fn fps(&self) -> u32 {
        self.shared.fps()
    }

    /// Valid before and while running; applies from the next tick.
    pub fn set_fps(&self, fps: u32) -> Result<()> {
        self.shared.set_fps(fps)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.shared.metrics)
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle::new(Arc::clone(&self.shared))
    }

    fn engine_mut(&mut self, operation: &'static str) -> Result<&mut Engine> {
        let state = self.shared.state();
        let engine = self
            .engine
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        match (engine, state) {
            (Some(engine), ServiceState::Created) => Ok(engine),
            _ => Err(Error::InvalidState {
                operation,
                state: state.as_str(),
            }),
        }
    }

    /// Attach a facade. Only allowed before `start`.
    pub fn register_facade<F: Facade + 'static>(&mut self, facade: F) -> Result<FacadeId> {
        self.register_boxed(Box::new(facade))
    }

    pub fn register_boxed(&mut self, facade: Box<dyn Facade>) -> Result<FacadeId> {
        Ok(self.engine_mut("register facade")?.register(facade))
    }

    /// Detach and return a facade. Only allowed before `start`.
    pub fn unregister_facade(&mut self, id: FacadeId) -> Result<Box<dyn Facade>> {
        self.engine_mut("unregister facade")?
            .unregister(id)
            .ok_or_else(|| Error::NotFound(format!("{id}")))
    }

    pub fn facade_count(&self) -> usize {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Engine::facade_count)
    }

    /// Schedule a timer before the service starts. Running services schedule
    /// through [`ServiceContext::schedule_timer`].
    pub fn schedule_timer<F>(
        &mut self,
        delay: Duration,
        period: Option<Duration>,
        callback: F,
    ) -> Result<TimerId>
    where
        F: FnMut(&mut ServiceContext<'_>) -> Result<()> + Send + 'static,
    {
        let engine = self.engine_mut("schedule timer")?;
        Ok(engine.core.timers.schedule(delay, period, Box::new(callback)))
    }

    pub fn push_inbound(&self, block: MessageBlock) -> Result<()> {
        self.handle().push_inbound(block)
    }

    pub fn try_pop_outbound(&self) -> Option<MessageBlock> {
        self.shared.outbound.try_pop_front()
    }

    /// Run every `on_start` and enter the update loop.
    ///
    /// Returns `Ok(false)` when a facade declined to start; the service is
    /// then `Stopped` and the facades that did start have seen `on_stop`.
    pub fn start(&mut self) -> Result<bool> {
        let state = self.shared.state();
        let slot = self.engine.get_mut().unwrap_or_else(PoisonError::into_inner);
        let engine = match slot.take() {
            Some(engine) if self.shared.transition(ServiceState::Created, ServiceState::Starting) => {
                engine
            }
            other => {
                *slot = other;
                return Err(Error::InvalidState {
                    operation: "start",
                    state: state.as_str(),
                });
            }
        };

        let (ready_tx, ready_rx) = crossbeam::channel::bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("svc-{}", self.shared.name))
            .spawn(move || engine.run(ready_tx));
        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                self.shared.set_state(ServiceState::Stopped);
                return Err(Error::Io(e));
            }
        };

        if ready_rx.recv().unwrap_or(false) {
            *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(join);
            info!(service = %self.shared.name, "Service started");
            Ok(true)
        } else {
            if join.join().is_err() {
                self.shared
                    .diag(Level::ERROR, "logic thread panicked during startup");
            }
            self.shared.set_state(ServiceState::Stopped);
            Ok(false)
        }
    }

    /// Stop the service and wait for teardown. Safe to call repeatedly and
    /// from several threads; every call returns after the service is
    /// `Stopped`.
    pub fn stop(&self) {
        let mut guard = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.request_stop();

        let Some(join) = guard.take() else {
            return;
        };
        if join.thread().id() == thread::current().id() {
            // Called from a callback: the loop exits after this tick.
            *guard = Some(join);
            return;
        }
        if join.join().is_err() {
            self.shared.diag(Level::ERROR, "logic thread panicked");
            self.shared.set_state(ServiceState::Stopped);
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .field("state", &self.shared.state())
            .field("fps", &self.shared.fps())
            .finish()
    }
}
