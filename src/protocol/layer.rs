//! The protocol layer contract and per-connection layer state.

use crate::core::block::SessionId;
use crate::error::Result;
use std::any::Any;
use std::collections::HashMap;

/// Codes carried by `Error::Protocol` so callers can tell failures apart
/// without parsing messages.
pub mod codes {
    pub const BAD_MAGIC: u16 = 1;
    pub const OVERSIZED: u16 = 2;
    pub const TRUNCATED: u16 = 3;
    pub const TRAILING_BYTES: u16 = 4;
    pub const SEQUENCE_GAP: u16 = 5;
    pub const DECOMPRESS: u16 = 6;
    pub const DECRYPT: u16 = 7;
    pub const BAD_FLAG: u16 = 8;
}

/// Result of one layer's receive-side transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete unit was recovered from the first `consumed` input bytes.
    Frame { data: Vec<u8>, consumed: usize },
    /// More input is required; `needed` is the total input length that would
    /// suffice, when the layer can tell.
    Incomplete { needed: Option<usize> },
}

impl Decoded {
    /// A frame that consumed its whole input.
    pub fn whole(data: Vec<u8>, input_len: usize) -> Self {
        Decoded::Frame {
            data,
            consumed: input_len,
        }
    }
}

/// One stage of the protocol stack.
///
/// Layers are shared by every connection of a service, so they take `&self`.
/// Anything that must survive between calls for one connection lives in the
/// [`LayerContext`] state slot instead.
pub trait ProtocolLayer: Send + Sync {
    /// Short name used to tag errors and logs.
    fn name(&self) -> &'static str;

    /// Send-side transform.
    fn encode(&self, data: Vec<u8>, ctx: &mut LayerContext<'_>) -> Result<Vec<u8>>;

    /// Receive-side transform; the inverse of [`encode`](Self::encode).
    fn decode(&self, data: &[u8], ctx: &mut LayerContext<'_>) -> Result<Decoded>;
}

/// Per-connection storage for layers that need memory across frames.
#[derive(Default)]
pub struct SessionState {
    session: SessionId,
    slots: HashMap<usize, Box<dyn Any + Send>>,
}

impl SessionState {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            slots: HashMap::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Forget all layer state, e.g. after the connection was reset.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn context(&mut self, stage: usize) -> LayerContext<'_> {
        LayerContext { stage, state: self }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("session", &self.session)
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// View of one connection's state handed to a single layer call.
pub struct LayerContext<'a> {
    stage: usize,
    state: &'a mut SessionState,
}

impl LayerContext<'_> {
    pub fn session(&self) -> SessionId {
        self.state.session
    }

    /// Position of the layer within its stack.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// This layer's state for this connection, created on first use.
    pub fn state_mut<T: Default + Send + 'static>(&mut self) -> &mut T {
        let slot = self
            .state
            .slots
            .entry(self.stage)
            .or_insert_with(|| Box::new(T::default()));
        if !slot.is::<T>() {
            *slot = Box::new(T::default());
        }
        slot.downcast_mut::<T>()
            .unwrap_or_else(|| unreachable!("slot holds the requested type"))
    }
}
