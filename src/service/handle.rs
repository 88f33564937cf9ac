//! State shared between a service's owner, its logic thread and I/O threads.

use super::{ServiceKind, ServiceState};
use crate::config::{INFINITE_FPS, MAX_FPS, MIN_FPS};
use crate::core::block::{MessageBlock, SessionId};
use crate::core::queue::{MessageQueue, SamplerQueue};
use crate::error::{Error, Result};
use crate::utils::logging::DiagnosticSink;
use crate::utils::metrics::Metrics;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;

pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) kind: ServiceKind,
    state: AtomicU8,
    stop_requested: AtomicBool,
    fps: AtomicU32,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    pub(crate) inbound: MessageQueue,
    pub(crate) outbound: MessageQueue,
    pub(crate) sampler: SamplerQueue,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) sink: Arc<dyn DiagnosticSink>,
}

impl Shared {
    pub(crate) fn new(
        name: String,
        kind: ServiceKind,
        fps: u32,
        inbound: MessageQueue,
        sampler: SamplerQueue,
        metrics: Arc<Metrics>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let (wake_tx, wake_rx) = channel::bounded(1);
        Self {
            name,
            kind,
            state: AtomicU8::new(ServiceState::Created as u8),
            stop_requested: AtomicBool::new(false),
            fps: AtomicU32::new(fps),
            wake_tx,
            wake_rx,
            inbound,
            outbound: MessageQueue::unbounded(),
            sampler,
            metrics,
            sink,
        }
    }

    pub(crate) fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn transition(&self, from: ServiceState, to: ServiceState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Ask the loop to stop at the next tick boundary. Never blocks.
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        // A service that never started has no loop to wind down.
        if !self.transition(ServiceState::Created, ServiceState::Stopped) {
            self.transition(ServiceState::Running, ServiceState::Stopping);
        }
        let _ = self.wake_tx.try_send(());
    }

    /// Sleep for up to `duration`, returning early on a stop request.
    pub(crate) fn sleep(&self, duration: Duration) {
        let _ = self.wake_rx.recv_timeout(duration);
    }

    pub(crate) fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub(crate) fn set_fps(&self, fps: u32) -> Result<()> {
        validate_fps(fps)?;
        match self.state() {
            ServiceState::Stopping | ServiceState::Stopped => Err(Error::InvalidState {
                operation: "set_fps",
                state: self.state().as_str(),
            }),
            _ => {
                self.fps.store(fps, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Mirror a block onto the sampler queue if one is enabled.
    pub(crate) fn sample(&self, block: &MessageBlock) {
        if self.sampler.is_enabled() && !self.sampler.sample(block) {
            self.metrics.sampler_drop();
        }
    }

    /// Queue a block for the I/O side.
    pub(crate) fn emit(&self, block: MessageBlock) -> Result<()> {
        self.sample(&block);
        self.outbound.push_back(block)
    }

    pub(crate) fn diag(&self, level: Level, message: &str) {
        self.sink.write_line(level, &self.name, message);
    }
}

pub(crate) fn validate_fps(fps: u32) -> Result<()> {
    if fps == INFINITE_FPS || (MIN_FPS..=MAX_FPS).contains(&fps) {
        Ok(())
    } else {
        Err(Error::limit(format!(
            "fps {fps} outside {MIN_FPS}..={MAX_FPS} and not infinite"
        )))
    }
}

/// Target duration of one tick, or `None` for an unthrottled loop.
pub(crate) fn frame_duration(fps: u32) -> Option<Duration> {
    if fps == INFINITE_FPS || fps == 0 {
        None
    } else {
        Some(Duration::from_micros(1_000_000 / u64::from(fps)))
    }
}

/// Cloneable, thread-safe access to a service for the I/O side.
///
/// A handle only ever talks to the service through its queues and atomic
/// state; it never touches facades or the protocol stack.
#[derive(Clone)]
pub struct ServiceHandle {
    shared: Arc<Shared>,
}

impl ServiceHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
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

    /// Change the update rate; takes effect at the next tick boundary.
    pub fn set_fps(&self, fps: u32) -> Result<()> {
        self.shared.set_fps(fps)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Hand a block to the service's logic thread.
    pub fn push_inbound(&self, block: MessageBlock) -> Result<()> {
        match self.shared.state() {
            state @ (ServiceState::Stopping | ServiceState::Stopped) => Err(Error::InvalidState {
                operation: "push_inbound",
                state: state.as_str(),
            }),
            _ => self.shared.inbound.push_back(block),
        }
    }

    pub fn push_data(&self, session: SessionId, payload: impl Into<Bytes>) -> Result<()> {
        self.push_inbound(MessageBlock::data(session, payload))
    }

    pub fn open_session(&self, session: SessionId) -> Result<()> {
        self.push_inbound(MessageBlock::session_opened(session))
    }

    pub fn close_session(&self, session: SessionId) -> Result<()> {
        self.push_inbound(MessageBlock::session_closed(session))
    }

    /// Next block for the I/O side to transmit, in encode order.
    pub fn try_pop_outbound(&self) -> Option<MessageBlock> {
        self.shared.outbound.try_pop_front()
    }

    pub fn try_pop_sampler(&self) -> Option<MessageBlock> {
        self.shared.sampler.try_pop_front()
    }

    pub fn inbound_len(&self) -> usize {
        self.shared.inbound.len()
    }

    pub fn outbound_len(&self) -> usize {
        self.shared.outbound.len()
    }

    /// Ask the service to stop at the next tick boundary. Never blocks and
    /// may be called any number of times.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state() == ServiceState::Stopped
    }

    /// Poll until the service reaches `Stopped` or `timeout` elapses.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_stopped() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .field("state", &self.shared.state())
            .finish()
    }
}
