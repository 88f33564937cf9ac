//! Length-prefixed framing.
//!
//! ## Frame Layout
//! ```text
//! [Magic(2, BE)] [Length(4, BE)] [Body(Length)]
//! ```
//!
//! Framing is the only layer that turns a byte stream back into discrete
//! units, so it is the one that reports `Incomplete` when a frame has not
//! fully arrived yet.

use super::layer::{codes, Decoded, LayerContext, ProtocolLayer};
use crate::config::{FRAME_MAGIC, MAX_FRAME_SIZE};
use crate::error::constants::{ERR_BAD_MAGIC, ERR_OVERSIZED_FRAME};
use crate::error::{Error, Result};

/// Magic plus length header.
pub const FRAME_HEADER_SIZE: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct FramingLayer {
    magic: u16,
    max_frame_size: usize,
}

impl FramingLayer {
    pub const NAME: &'static str = "framing";

    pub fn new(max_frame_size: usize) -> Self {
        Self {
            magic: FRAME_MAGIC,
            max_frame_size,
        }
    }

    pub fn with_magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FramingLayer {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl ProtocolLayer for FramingLayer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode(&self, data: Vec<u8>, _ctx: &mut LayerContext<'_>) -> Result<Vec<u8>> {
        if data.len() > self.max_frame_size || data.len() > u32::MAX as usize {
            return Err(Error::protocol(
                Self::NAME,
                codes::OVERSIZED,
                format!("{ERR_OVERSIZED_FRAME}: {} bytes", data.len()),
            ));
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
        frame.extend_from_slice(&self.magic.to_be_bytes());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    fn decode(&self, data: &[u8], _ctx: &mut LayerContext<'_>) -> Result<Decoded> {
        // Reject garbage as soon as the magic is visible.
        if data.len() >= 2 {
            let magic = u16::from_be_bytes([data[0], data[1]]);
            if magic != self.magic {
                return Err(Error::protocol(
                    Self::NAME,
                    codes::BAD_MAGIC,
                    format!("{ERR_BAD_MAGIC}: 0x{magic:04x}"),
                ));
            }
        }

        if data.len() < FRAME_HEADER_SIZE {
            return Ok(Decoded::Incomplete {
                needed: Some(FRAME_HEADER_SIZE),
            });
        }

        let length = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
        if length > self.max_frame_size {
            return Err(Error::protocol(
                Self::NAME,
                codes::OVERSIZED,
                format!("{ERR_OVERSIZED_FRAME}: {length} bytes"),
            ));
        }

        let total = FRAME_HEADER_SIZE + length;
        if data.len() < total {
            return Ok(Decoded::Incomplete {
                needed: Some(total),
            });
        }

        Ok(Decoded::Frame {
            data: data[FRAME_HEADER_SIZE..total].to_vec(),
            consumed: total,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::core::block::SessionId;
    use crate::error::ErrorKind;
    use crate::protocol::layer::SessionState;

    fn frame(layer: &FramingLayer, body: &[u8]) -> Vec<u8> {
        let mut state = SessionState::new(SessionId(1));
        layer.encode(body.to_vec(), &mut state.context(0)).unwrap()
    }

    #[test]
    fn test_partial_frame_is_incomplete() {
        let layer = FramingLayer::default();
        let mut state = SessionState::new(SessionId(1));
        let bytes = frame(&layer, b"hello world");

        for cut in [0, 1, 5, bytes.len() - 1] {
            let result = layer.decode(&bytes[..cut], &mut state.context(0)).unwrap();
            assert!(matches!(result, Decoded::Incomplete { .. }), "cut {cut}");
        }

        let full = layer.decode(&bytes, &mut state.context(0)).unwrap();
        assert_eq!(
            full,
            Decoded::Frame {
                data: b"hello world".to_vec(),
                consumed: bytes.len()
            }
        );
    }

    #[test]
    fn test_trailing_bytes_left_for_next_frame() {
        let layer = FramingLayer::default();
        let mut state = SessionState::new(SessionId(1));
        let mut bytes = frame(&layer, b"one");
        let first_len = bytes.len();
        bytes.extend(frame(&layer, b"two"));

        match layer.decode(&bytes, &mut state.context(0)).unwrap() {
            Decoded::Frame { data, consumed } => {
                assert_eq!(data, b"one");
                assert_eq!(consumed, first_len);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let layer = FramingLayer::default();
        let mut state = SessionState::new(SessionId(1));
        let err = layer
            .decode(&[0xde, 0xad, 0, 0, 0, 0], &mut state.context(0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.layer(), Some(FramingLayer::NAME));
    }

    #[test]
    fn test_oversized_length_rejected_before_body_arrives() {
        let layer = FramingLayer::new(16);
        let mut state = SessionState::new(SessionId(1));
        let mut header = FRAME_MAGIC.to_be_bytes().to_vec();
        header.extend_from_slice(&1000u32.to_be_bytes());
        let err = layer.decode(&header, &mut state.context(0)).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                code: codes::OVERSIZED,
                ..
            }
        ));

        let err = layer
            .encode(vec![0; 17], &mut state.context(0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
