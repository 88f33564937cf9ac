//! The view of a service handed to facade callbacks and timers.

use super::handle::{ServiceHandle, Shared};
use super::session::Session;
use super::timer::{TimerId, TimerQueue};
use super::{ServiceKind, ServiceState};
use crate::core::block::{MessageBlock, SessionId};
use crate::core::packet::Packet;
use crate::core::stream::{Endian, Stream};
use crate::error::{Error, Result};
use crate::protocol::ProtocolStack;
use crate::utils::metrics::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything the logic thread owns apart from the facades themselves.
pub(crate) struct Core {
    pub(crate) shared: Arc<Shared>,
    pub(crate) stack: ProtocolStack,
    pub(crate) sessions: HashMap<SessionId, Session>,
    pub(crate) timers: TimerQueue,
    /// Sessions closed by the application, awaiting `SESSION_DESTROY`.
    pub(crate) closed: Vec<SessionId>,
    pub(crate) tick_budget: usize,
    pub(crate) max_session_buffer: usize,
}

impl Core {
    pub(crate) fn send(&mut self, session: SessionId, opcode: u32, payload: Vec<u8>) -> Result<()> {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return Err(Error::NotFound(format!("session {session}")));
        };
        let bytes = match self.shared.kind {
            ServiceKind::Raw => payload,
            ServiceKind::Normal => self
                .stack
                .encode(&Packet::new(session, opcode, payload), &mut entry.state)?,
        };
        let len = bytes.len();
        self.shared.emit(MessageBlock::data(session, bytes))?;
        self.shared.metrics.packet_sent(len);
        Ok(())
    }

    pub(crate) fn close_session(&mut self, session: SessionId) -> Result<()> {
        if self.sessions.remove(&session).is_none() {
            return Err(Error::NotFound(format!("session {session}")));
        }
        debug!(service = %self.shared.name, %session, "Closing session");
        self.closed.push(session);
        self.shared.emit(MessageBlock::session_closed(session))
    }
}

/// Non-owning access to the running service.
///
/// Only lives for the duration of one callback, so a facade can never hold
/// on to its service past teardown.
pub struct ServiceContext<'a> {
    core: &'a mut Core,
}

impl<'a> ServiceContext<'a> {
    pub(crate) fn new(core: &'a mut Core) -> Self {
        Self { core }
    }

    pub fn name(&self) -> &str {
        &self.core.shared.name
    }

    pub fn kind(&self) -> ServiceKind {
        self.core.shared.kind
    }

    pub fn state(&self) -> ServiceState {
        self.core.shared.state()
    }

    /// Byte order of payload streams.
    pub fn endian(&self) -> Endian {
        self.core.stack.endian()
    }

    /// An empty stream in the service's payload byte order.
    pub fn stream(&self) -> Stream {
        Stream::new().with_endian(self.endian())
    }

    pub fn has_session(&self, session: SessionId) -> bool {
        self.core.sessions.contains_key(&session)
    }

    pub fn session_count(&self) -> usize {
        self.core.sessions.len()
    }

    /// Encode a packet for `session` and queue it for the I/O side.
    ///
    /// Raw services send the payload bytes as-is and ignore `opcode`.
    pub fn send(&mut self, session: SessionId, opcode: u32, payload: Stream) -> Result<()> {
        self.core.send(session, opcode, payload.into_vec())
    }

    /// Forget `session` and tell the I/O side to close it.
    pub fn close_session(&mut self, session: SessionId) -> Result<()> {
        self.core.close_session(session)
    }

    /// Run `callback` after `delay`, then every `period` if one is given.
    pub fn schedule_timer<F>(
        &mut self,
        delay: Duration,
        period: Option<Duration>,
        callback: F,
    ) -> TimerId
    where
        F: FnMut(&mut ServiceContext<'_>) -> Result<()> + Send + 'static,
    {
        self.core.timers.schedule(delay, period, Box::new(callback))
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.core.timers.cancel(id)
    }

    pub fn fps(&self) -> u32 {
        self.core.shared.fps()
    }

    /// Change the update rate from the next tick on.
    pub fn set_fps(&self, fps: u32) -> Result<()> {
        self.core.shared.set_fps(fps)
    }

    /// Stop after the current tick.
    pub fn request_stop(&self) {
        self.core.shared.request_stop();
    }

    pub fn metrics(&self) -> &Metrics {
        &self.core.shared.metrics
    }

    /// A handle that may be moved to other threads.
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle::new(Arc::clone(&self.core.shared))
    }
}
