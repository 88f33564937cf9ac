//! Decoded application packets.

use crate::core::block::SessionId;
use crate::core::stream::{Endian, Stream};
use crate::error::{Error, Result};

/// Size of the opcode header the stack prepends to every payload.
pub const PACKET_HEADER_SIZE: usize = 4;

/// One application-level message: an opcode plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub session: SessionId,
    pub opcode: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(session: SessionId, opcode: u32, payload: Vec<u8>) -> Self {
        Self {
            session,
            opcode,
            payload,
        }
    }

    pub fn from_stream(session: SessionId, opcode: u32, stream: Stream) -> Self {
        Self::new(session, opcode, stream.into_vec())
    }

    /// Payload wrapped in a read stream with the given byte order.
    pub fn stream(&self, endian: Endian) -> Stream {
        Stream::from_slice(&self.payload).with_endian(endian)
    }

    /// Serialize as `[opcode u32 BE][payload]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKET_HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(session: SessionId, data: &[u8]) -> Result<Self> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(Error::limit(format!(
                "packet shorter than header: {} bytes",
                data.len()
            )));
        }
        let (header, payload) = data.split_at(PACKET_HEADER_SIZE);
        let opcode = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        Ok(Self::new(session, opcode, payload.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_packet_header_layout() {
        let packet = Packet::new(SessionId(1), 0x0102_0304, vec![9]);
        assert_eq!(packet.to_bytes(), vec![1, 2, 3, 4, 9]);
        let back = Packet::from_bytes(SessionId(1), &packet.to_bytes()).unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn test_short_packet_rejected() {
        let err = Packet::from_bytes(SessionId(1), &[0, 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Limit);
    }

    #[test]
    fn test_payload_stream_reads_fields() {
        let mut s = Stream::new();
        s.write(5u16);
        s.write_string("hi").unwrap();
        let packet = Packet::from_stream(SessionId(2), 10, s);
        let mut reader = packet.stream(Endian::NETWORK);
        assert_eq!(reader.read::<u16>().unwrap(), 5);
        assert_eq!(reader.read_string().unwrap(), "hi");
    }
}
