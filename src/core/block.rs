//! Message blocks: the unit of ownership transfer across the queue boundary.

use bytes::Bytes;
use std::fmt;

/// Identity of one connection as seen by the I/O side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockKind {
    /// Raw (inbound) or encoded (outbound) application bytes.
    Data = 0,
    /// The I/O side accepted or opened a connection.
    SessionOpened = 1,
    /// The connection is gone (inbound) or must be closed (outbound).
    SessionClosed = 2,
    /// Copy of a primary-path block for external monitoring.
    Sampler = 3,
}

impl BlockKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BlockKind::Data),
            1 => Some(BlockKind::SessionOpened),
            2 => Some(BlockKind::SessionClosed),
            3 => Some(BlockKind::Sampler),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn is_control(self) -> bool {
        matches!(self, BlockKind::SessionOpened | BlockKind::SessionClosed)
    }
}

/// Owned envelope around a payload.
///
/// Blocks are moved, never shared: pushing a block onto a queue gives up the
/// sender's handle to it, and popping hands it to exactly one consumer.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageBlock {
    kind: BlockKind,
    session: SessionId,
    payload: Bytes,
}

impl MessageBlock {
    pub fn new(kind: BlockKind, session: SessionId, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            session,
            payload: payload.into(),
        }
    }

    pub fn data(session: SessionId, payload: impl Into<Bytes>) -> Self {
        Self::new(BlockKind::Data, session, payload)
    }

    pub fn session_opened(session: SessionId) -> Self {
        Self::new(BlockKind::SessionOpened, session, Bytes::new())
    }

    pub fn session_closed(session: SessionId) -> Self {
        Self::new(BlockKind::SessionClosed, session, Bytes::new())
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// A sampler copy shares the payload storage; the original stays owned
    /// by the primary path.
    pub(crate) fn sampler_copy(&self) -> MessageBlock {
        MessageBlock {
            kind: BlockKind::Sampler,
            session: self.session,
            payload: self.payload.clone(),
        }
    }
}
