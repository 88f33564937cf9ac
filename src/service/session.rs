//! Per-connection receive state kept by a service.

use crate::core::block::SessionId;
use crate::core::packet::Packet;
use crate::error::Error;
use crate::protocol::{ProtocolStack, SessionState, StackDecode};
use bytes::{Buf, BytesMut};
use std::time::Instant;

pub(crate) struct Session {
    pub(crate) state: SessionState,
    buffer: BytesMut,
    opened_at: Instant,
}

impl Session {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            state: SessionState::new(id),
            buffer: BytesMut::new(),
            opened_at: Instant::now(),
        }
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    /// Append raw bytes and decode every complete packet now available.
    ///
    /// Packets decoded ahead of a failure are still returned. A returned
    /// error means the connection's byte stream can no longer be trusted.
    pub(crate) fn feed(
        &mut self,
        stack: &ProtocolStack,
        data: &[u8],
        max_buffer: usize,
    ) -> (Vec<Packet>, Option<Error>) {
        self.buffer.extend_from_slice(data);
        let mut packets = Vec::new();

        while !self.buffer.is_empty() {
            match stack.decode(&self.buffer, &mut self.state) {
                Ok(StackDecode::Packet { packet, consumed }) => {
                    self.buffer.advance(consumed);
                    packets.push(packet);
                }
                Ok(StackDecode::Incomplete { .. }) => {
                    if self.buffer.len() > max_buffer {
                        let error = Error::limit(format!(
                            "session {} buffered {} bytes without a complete frame",
                            self.state.session(),
                            self.buffer.len()
                        ));
                        return (packets, Some(error));
                    }
                    break;
                }
                Err(error) => return (packets, Some(error)),
            }
        }
        (packets, None)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::StackConfig;
    use crate::error::ErrorKind;

    #[test]
    fn test_frames_split_across_blocks() {
        let stack = ProtocolStack::from_config(&StackConfig::default());
        let mut tx = SessionState::new(SessionId(1));
        let mut wire = stack
            .encode(&Packet::new(SessionId(1), 1, b"first".to_vec()), &mut tx)
            .unwrap();
        wire.extend(
            stack
                .encode(&Packet::new(SessionId(1), 2, b"second".to_vec()), &mut tx)
                .unwrap(),
        );

        let mut session = Session::new(SessionId(1));
        let (head, tail) = wire.split_at(8);
        let (packets, error) = session.feed(&stack, head, 1024);
        assert!(packets.is_empty() && error.is_none());
        assert_eq!(session.buffered(), 8);

        let (packets, error) = session.feed(&stack, tail, 1024);
        assert!(error.is_none());
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].opcode, 1);
        assert_eq!(packets[1].payload, b"second");
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_buffer_limit_is_enforced() {
        let stack = ProtocolStack::from_config(&StackConfig::default());
        let mut header = crate::config::FRAME_MAGIC.to_be_bytes().to_vec();
        header.extend_from_slice(&4096u32.to_be_bytes());
        header.extend_from_slice(&[0u8; 100]);

        let mut session = Session::new(SessionId(1));
        let (packets, err) = session.feed(&stack, &header, 64);
        assert!(packets.is_empty());
        assert_eq!(err.unwrap().kind(), ErrorKind::Limit);
    }

    #[test]
    fn test_packets_before_a_corrupt_frame_survive() {
        let stack = ProtocolStack::from_config(&StackConfig::default());
        let mut tx = SessionState::new(SessionId(1));
        let mut wire = stack
            .encode(&Packet::new(SessionId(1), 7, b"good".to_vec()), &mut tx)
            .unwrap();
        wire.extend_from_slice(&[0xDE, 0xAD, 0, 0, 0, 0]);

        let mut session = Session::new(SessionId(1));
        let (packets, err) = session.feed(&stack, &wire, 1024);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload, b"good");
        assert_eq!(err.unwrap().kind(), ErrorKind::Protocol);
    }
}
