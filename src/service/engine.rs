//! The logic thread: startup, the tick loop, dispatch and teardown.
//!
//! ## Tick Order
//! 1. Drain up to `tick_budget` inbound blocks, decoding and dispatching each
//! 2. Fire due timers, earliest deadline first
//! 3. `on_update` for every subscribed facade, in registration order
//! 4. `on_idle` when steps 1 to 3 did no work
//!
//! Sessions closed by the application are reported to `SESSION_DESTROY`
//! subscribers right after the callback that closed them.

use super::context::{Core, ServiceContext};
use super::facade::{Facade, FacadeEvents, FacadeId, FacadeSlot};
use super::handle::frame_duration;
use super::session::Session;
use super::{ServiceKind, ServiceState};
use crate::core::block::{BlockKind, MessageBlock, SessionId};
use crate::core::packet::Packet;
use crate::error::constants::ERR_FACADE_PANICKED;
use crate::error::{Error, Result};
use crate::utils::metrics::Timer;
use crate::utils::TimeSpan;
use crossbeam::channel::Sender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};

pub(crate) struct Engine {
    pub(crate) core: Core,
    facades: Vec<FacadeSlot>,
    next_facade: u64,
}

impl Engine {
    pub(crate) fn new(core: Core) -> Self {
        Self {
            core,
            facades: Vec::new(),
            next_facade: 0,
        }
    }

    pub(crate) fn register(&mut self, facade: Box<dyn Facade>) -> FacadeId {
        let id = FacadeId(self.next_facade);
        self.next_facade += 1;
        let slot = FacadeSlot::new(id, facade);
        debug!(
            service = %self.core.shared.name,
            facade = %slot.name,
            events = ?slot.events,
            "Registered facade"
        );
        self.facades.push(slot);
        id
    }

    pub(crate) fn unregister(&mut self, id: FacadeId) -> Option<Box<dyn Facade>> {
        let index = self.facades.iter().position(|slot| slot.id == id)?;
        Some(self.facades.remove(index).facade)
    }

    pub(crate) fn facade_count(&self) -> usize {
        self.facades.len()
    }

    /// Thread body. Reports startup success on `ready` before entering the
    /// loop.
    pub(crate) fn run(mut self, ready: Sender<bool>) {
        let shared = self.core.shared.clone();

        if let Err(started) = self.start_facades() {
            self.stop_facades(started);
            self.teardown();
            shared.set_state(ServiceState::Stopped);
            let _ = ready.send(false);
            return;
        }
        let started = self.facades.len();

        shared.transition(ServiceState::Starting, ServiceState::Running);
        let _ = ready.send(true);
        info!(service = %shared.name, facades = started, fps = shared.fps(), "Service running");

        self.run_loop();

        shared.set_state(ServiceState::Stopping);
        self.stop_facades(started);
        self.teardown();
        shared.set_state(ServiceState::Stopped);
        shared.metrics.log_metrics(&shared.name);
        info!(service = %shared.name, "Service stopped");
    }

    fn run_loop(&mut self) {
        let shared = self.core.shared.clone();
        let mut last_tick = Instant::now();

        while !shared.stop_requested() {
            let tick_start = Instant::now();
            let elapsed = TimeSpan::from(tick_start.duration_since(last_tick));
            last_tick = tick_start;

            let frame = frame_duration(shared.fps());
            let busy = self.tick(elapsed, tick_start, frame);

            match frame {
                Some(frame) => {
                    if let Some(rest) = frame.checked_sub(tick_start.elapsed()) {
                        if !rest.is_zero() {
                            shared.sleep(rest);
                        }
                    }
                }
                None if !busy => std::thread::yield_now(),
                None => {}
            }
        }
    }

    /// One pass of the update loop. Returns whether any blocks, timers or
    /// update handlers ran.
    fn tick(&mut self, elapsed: TimeSpan, tick_start: Instant, frame: Option<Duration>) -> bool {
        let drained = self.drain_inbound();
        let fired = self.fire_timers();

        let updated = self.dispatch(FacadeEvents::UPDATE, "on_update", |facade, ctx| {
            facade.on_update(ctx, elapsed)
        });
        self.flush_closed();

        let idle = drained == 0 && fired == 0 && updated == 0;
        if idle {
            let residual = frame
                .and_then(|frame| frame.checked_sub(tick_start.elapsed()))
                .unwrap_or_default();
            let residual = TimeSpan::from(residual);
            self.dispatch(FacadeEvents::IDLE, "on_idle", |facade, ctx| {
                facade.on_idle(ctx, residual)
            });
            self.flush_closed();
        }

        self.core.shared.metrics.tick(idle);
        !idle
    }

    fn drain_inbound(&mut self) -> usize {
        let mut batch = Vec::with_capacity(self.core.tick_budget.min(64));
        let drained = self
            .core
            .shared
            .inbound
            .drain_into(&mut batch, self.core.tick_budget);
        for block in batch {
            self.handle_block(block);
            self.flush_closed();
        }
        drained
    }

    fn handle_block(&mut self, block: MessageBlock) {
        let shared = &self.core.shared;
        shared.metrics.block_received(block.len());
        shared.sample(&block);

        let session = block.session();
        match block.kind() {
            BlockKind::Data => self.on_data(session, block.payload()),
            BlockKind::SessionOpened => self.open_session(session),
            BlockKind::SessionClosed => {
                if self.core.sessions.remove(&session).is_some() {
                    debug!(service = %self.core.shared.name, %session, "Session closed by peer");
                    self.dispatch_session(FacadeEvents::SESSION_DESTROY, session);
                }
            }
            // Diagnostic traffic is only mirrored.
            BlockKind::Sampler => {}
        }
    }

    fn open_session(&mut self, session: SessionId) {
        if self.core.sessions.contains_key(&session) {
            return;
        }
        self.core.sessions.insert(session, Session::new(session));
        debug!(service = %self.core.shared.name, %session, "Session opened");
        self.dispatch_session(FacadeEvents::SESSION_CREATE, session);
    }

    fn on_data(&mut self, session: SessionId, payload: &[u8]) {
        // Data on an unknown connection opens it implicitly.
        self.open_session(session);
        self.flush_closed();

        let core = &mut self.core;
        let Some(entry) = core.sessions.get_mut(&session) else {
            return;
        };

        let (packets, failure) = match core.shared.kind {
            ServiceKind::Raw => (vec![Packet::new(session, 0, payload.to_vec())], None),
            ServiceKind::Normal => entry.feed(&core.stack, payload, core.max_session_buffer),
        };

        for packet in packets {
            if !self.core.sessions.contains_key(&session) {
                break;
            }
            self.core.shared.metrics.packet_decoded();
            let endian = self.core.stack.endian();
            self.dispatch(FacadeEvents::DATA_ARRIVAL, "on_data_arrival", |facade, ctx| {
                let mut payload = packet.stream(endian);
                facade.on_data_arrival(ctx, packet.session, packet.opcode, &mut payload)
            });
            self.flush_closed();
        }

        if let Some(error) = failure {
            if self.core.sessions.contains_key(&session) {
                self.drop_session(session, error);
            }
        }
    }

    /// Discard a connection whose byte stream can no longer be decoded.
    fn drop_session(&mut self, session: SessionId, error: Error) {
        let age = self
            .core
            .sessions
            .remove(&session)
            .map(|state| state.age())
            .unwrap_or_default();

        let shared = self.core.shared.clone();
        shared.metrics.decode_error();
        shared.metrics.session_dropped();
        warn!(
            service = %shared.name,
            %session,
            layer = error.layer().unwrap_or("packet"),
            age_ms = age.as_millis() as u64,
            error = %error,
            "Dropping session after decode failure"
        );

        if let Err(e) = shared.emit(MessageBlock::session_closed(session)) {
            shared.diag(Level::ERROR, &format!("cannot notify close of {session}: {e}"));
        }
        self.report(&format!("session {session}"), error);
        self.dispatch_session(FacadeEvents::SESSION_DESTROY, session);
    }

    fn dispatch_session(&mut self, event: FacadeEvents, session: SessionId) {
        if event == FacadeEvents::SESSION_CREATE {
            self.dispatch(event, "on_session_create", |facade, ctx| {
                facade.on_session_create(ctx, session)
            });
        } else {
            self.dispatch(event, "on_session_destroy", |facade, ctx| {
                facade.on_session_destroy(ctx, session)
            });
        }
    }

    fn flush_closed(&mut self) {
        while !self.core.closed.is_empty() {
            let closed = std::mem::take(&mut self.core.closed);
            for session in closed {
                self.dispatch_session(FacadeEvents::SESSION_DESTROY, session);
            }
        }
    }

    fn fire_timers(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0;

        while let Some(mut entry) = self.core.timers.pop_due(now) {
            let id = entry.id;
            let outcome = {
                let mut ctx = ServiceContext::new(&mut self.core);
                panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(&mut ctx)))
            };
            self.core.timers.finish(entry, now);
            fired += 1;
            self.core.shared.metrics.timer_fired();

            let result = outcome.unwrap_or_else(|payload| Err(panic_error(payload.as_ref())));
            if let Err(error) = result {
                self.core.shared.metrics.facade_error();
                self.report(&id.to_string(), error);
            }
            self.flush_closed();
        }

        fired
    }

    /// Invoke one facade, converting a panic into an error.
    fn call<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut dyn Facade, &mut ServiceContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let slot = &mut self.facades[index];
        let mut ctx = ServiceContext::new(&mut self.core);
        panic::catch_unwind(AssertUnwindSafe(|| f(slot.facade.as_mut(), &mut ctx)))
            .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
    }

    /// Invoke `f` on every facade subscribed to `event`, in registration
    /// order. Returns the number of facades invoked.
    fn dispatch(
        &mut self,
        event: FacadeEvents,
        label: &str,
        mut f: impl FnMut(&mut dyn Facade, &mut ServiceContext<'_>) -> Result<()>,
    ) -> usize {
        let mut invoked = 0;
        for index in 0..self.facades.len() {
            if !self.facades[index].wants(event) {
                continue;
            }
            invoked += 1;
            if let Err(error) = self.call(index, &mut f) {
                self.core.shared.metrics.facade_error();
                let origin = format!("{}.{label}", self.facades[index].name);
                self.report(&origin, error);
            }
        }
        invoked
    }

    /// Route an error to `on_error` subscribers, or to the diagnostic sink
    /// when there are none.
    fn report(&mut self, origin: &str, error: Error) {
        let subscribers: Vec<usize> = (0..self.facades.len())
            .filter(|&index| self.facades[index].wants(FacadeEvents::ERROR))
            .collect();

        if subscribers.is_empty() {
            self.core
                .shared
                .diag(Level::ERROR, &format!("{origin}: {error}"));
            return;
        }

        debug!(service = %self.core.shared.name, origin, error = %error, "Dispatching error");
        for index in subscribers {
            let outcome = self.call(index, |facade, ctx| {
                facade.on_error(ctx, &error);
                Ok(())
            });
            if let Err(nested) = outcome {
                let name = &self.facades[index].name;
                self.core
                    .shared
                    .diag(Level::ERROR, &format!("{name}.on_error: {nested}"));
            }
        }
    }

    /// Run `on_start` in registration order. On refusal or failure returns
    /// the number of facades that started before it.
    fn start_facades(&mut self) -> std::result::Result<(), usize> {
        let _timer = Timer::start("service_start");
        for index in 0..self.facades.len() {
            if !self.facades[index].wants(FacadeEvents::START) {
                continue;
            }
            match self.call(index, |facade, ctx| facade.on_start(ctx)) {
                Ok(true) => {}
                Ok(false) => {
                    let name = &self.facades[index].name;
                    self.core.shared.diag(
                        Level::WARN,
                        &format!("{name} declined to start; aborting startup"),
                    );
                    return Err(index);
                }
                Err(error) => {
                    self.core.shared.metrics.facade_error();
                    let origin = format!("{}.on_start", self.facades[index].name);
                    self.report(&origin, error);
                    return Err(index);
                }
            }
        }
        Ok(())
    }

    /// Run `on_stop` on the first `started` facades in reverse order.
    /// Failures are logged and never dispatched further.
    fn stop_facades(&mut self, started: usize) {
        for index in (0..started.min(self.facades.len())).rev() {
            if !self.facades[index].wants(FacadeEvents::STOP) {
                continue;
            }
            if let Err(error) = self.call(index, |facade, ctx| facade.on_stop(ctx)) {
                self.core.shared.metrics.facade_error();
                let name = &self.facades[index].name;
                self.core
                    .shared
                    .diag(Level::ERROR, &format!("{name}.on_stop: {error}"));
            }
        }
    }

    /// Release facades, sessions, timers and the protocol stack.
    fn teardown(&mut self) {
        let _timer = Timer::start("service_teardown");
        let abandoned = self.core.shared.inbound.clear();
        let sessions = self.core.sessions.len();
        self.facades.clear();
        self.core.sessions.clear();
        self.core.closed.clear();
        self.core.timers.clear();
        drop(std::mem::take(&mut self.core.stack));
        debug!(
            service = %self.core.shared.name,
            abandoned,
            sessions,
            "Released service resources"
        );
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Error::Facade(format!("{ERR_FACADE_PANICKED}: {message}"))
}
