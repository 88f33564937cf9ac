//! Optional payload compression.
//!
//! Every unit carries a one-byte flag so small or incompressible payloads can
//! pass through untouched: `0` raw, `1` compressed with the configured codec.

use super::layer::{codes, Decoded, LayerContext, ProtocolLayer};
use crate::error::{Error, Result};
use crate::utils::compression::{CompressionKind, Compressor};

const FLAG_RAW: u8 = 0;
const FLAG_COMPRESSED: u8 = 1;

#[derive(Debug, Clone, Copy)]
pub struct CompressionLayer {
    compressor: Compressor,
}

impl CompressionLayer {
    pub const NAME: &'static str = "compression";

    /// `threshold` is the smallest payload worth compressing; `max_output`
    /// bounds decompressed size.
    pub fn new(kind: CompressionKind, threshold: usize, max_output: usize) -> Self {
        Self {
            compressor: Compressor::new(kind, threshold, max_output),
        }
    }

    pub fn kind(&self) -> CompressionKind {
        self.compressor.kind()
    }
}

impl ProtocolLayer for CompressionLayer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode(&self, data: Vec<u8>, _ctx: &mut LayerContext<'_>) -> Result<Vec<u8>> {
        let (body, compressed) = self.compressor.maybe_compress(&data)?;
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(if compressed { FLAG_COMPRESSED } else { FLAG_RAW });
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(&self, data: &[u8], _ctx: &mut LayerContext<'_>) -> Result<Decoded> {
        let Some((&flag, body)) = data.split_first() else {
            return Err(Error::protocol(
                Self::NAME,
                codes::TRUNCATED,
                "missing compression flag",
            ));
        };

        let plain = match flag {
            FLAG_RAW => body.to_vec(),
            FLAG_COMPRESSED => self.compressor.decompress(body).map_err(|e| {
                Error::protocol(Self::NAME, codes::DECOMPRESS, e.to_string())
            })?,
            other => {
                return Err(Error::protocol(
                    Self::NAME,
                    codes::BAD_FLAG,
                    format!("unknown compression flag {other}"),
                ))
            }
        };
        Ok(Decoded::whole(plain, data.len()))
    }
}
