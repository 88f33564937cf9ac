//! Per-connection sequence numbers.
//!
//! Each unit is prefixed with a big-endian `u32` counter. Send and receive
//! counters live in the connection's layer state, start at zero and wrap.
//! A unit whose number differs from the expected one was lost, reordered or
//! replayed, and the connection cannot be trusted past that point.

use super::layer::{codes, Decoded, LayerContext, ProtocolLayer};
use crate::error::constants::ERR_SEQUENCE_GAP;
use crate::error::{Error, Result};

const SEQUENCE_SIZE: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequenceState {
    pub next_send: u32,
    pub next_recv: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceLayer;

impl SequenceLayer {
    pub const NAME: &'static str = "sequence";
}

impl ProtocolLayer for SequenceLayer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode(&self, data: Vec<u8>, ctx: &mut LayerContext<'_>) -> Result<Vec<u8>> {
        let state = ctx.state_mut::<SequenceState>();
        let seq = state.next_send;
        state.next_send = seq.wrapping_add(1);

        let mut out = Vec::with_capacity(SEQUENCE_SIZE + data.len());
        out.extend_from_slice(&seq.to_be_bytes());
        out.extend_from_slice(&data);
        Ok(out)
    }

    fn decode(&self, data: &[u8], ctx: &mut LayerContext<'_>) -> Result<Decoded> {
        if data.len() < SEQUENCE_SIZE {
            return Err(Error::protocol(
                Self::NAME,
                codes::TRUNCATED,
                "missing sequence number",
            ));
        }
        let seq = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

        let state = ctx.state_mut::<SequenceState>();
        if seq != state.next_recv {
            return Err(Error::protocol(
                Self::NAME,
                codes::SEQUENCE_GAP,
                format!(
                    "{ERR_SEQUENCE_GAP}: expected {}, got {seq}",
                    state.next_recv
                ),
            ));
        }
        state.next_recv = seq.wrapping_add(1);

        Ok(Decoded::whole(data[SEQUENCE_SIZE..].to_vec(), data.len()))
    }
}
