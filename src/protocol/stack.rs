//! Ordered composition of protocol layers.
//!
//! Layers are applied in registration order on send and in reverse order on
//! receive, so the first layer pushed is the innermost. Only the outermost
//! layer sees raw connection bytes and may report that more input is needed;
//! every inner layer must consume exactly the unit handed to it.

use super::cipher::CipherLayer;
use super::compression::CompressionLayer;
use super::framing::FramingLayer;
use super::layer::{codes, Decoded, ProtocolLayer, SessionState};
use super::sequence::SequenceLayer;
use crate::config::StackConfig;
use crate::core::packet::Packet;
use crate::core::stream::Endian;
use crate::error::{Error, Result};
use crate::utils::compression::CompressionKind;
use crate::utils::crypto::KEY_SIZE;
use tracing::trace;

/// Outcome of decoding from the front of a connection's receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackDecode {
    /// One packet, recovered from the first `consumed` bytes.
    Packet { packet: Packet, consumed: usize },
    /// Not enough bytes for a whole unit yet.
    Incomplete { needed: Option<usize> },
}

#[derive(Default)]
pub struct ProtocolStack {
    layers: Vec<Box<dyn ProtocolLayer>>,
    endian: Endian,
}

impl ProtocolStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the stack described by `config`: sequence, compression, framing,
    /// innermost first.
    pub fn from_config(config: &StackConfig) -> Self {
        let mut stack = Self::new().with_endian(config.default_endian);
        if config.sequence {
            stack.push_layer(SequenceLayer);
        }
        if config.compression != CompressionKind::None {
            stack.push_layer(CompressionLayer::new(
                config.compression,
                config.compression_threshold_bytes,
                config.max_frame_size,
            ));
        }
        if config.framing {
            stack.push_layer(FramingLayer::new(config.max_frame_size));
        }
        stack
    }

    /// Like [`from_config`](Self::from_config) with a cipher layer placed just
    /// inside framing. The key buffer is zeroized.
    pub fn from_config_with_cipher(config: &StackConfig, key: &mut [u8; KEY_SIZE]) -> Self {
        let mut stack = Self::from_config(config);
        let index = if config.framing {
            stack.layers.len() - 1
        } else {
            stack.layers.len()
        };
        stack.insert_layer(index, CipherLayer::new(key));
        stack
    }

    pub fn with_layer<L: ProtocolLayer + 'static>(mut self, layer: L) -> Self {
        self.push_layer(layer);
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Register a layer outside all existing ones.
    pub fn push_layer<L: ProtocolLayer + 'static>(&mut self, layer: L) {
        self.layers.push(Box::new(layer));
    }

    /// Register a layer at `index`, clamped to the current length.
    pub fn insert_layer<L: ProtocolLayer + 'static>(&mut self, index: usize, layer: L) {
        let index = index.min(self.layers.len());
        self.layers.insert(index, Box::new(layer));
    }

    /// Remove the first layer called `name`.
    pub fn remove_layer(&mut self, name: &str) -> Result<Box<dyn ProtocolLayer>> {
        let index = self
            .layers
            .iter()
            .position(|layer| layer.name() == name)
            .ok_or_else(|| Error::NotFound(format!("protocol layer '{name}'")))?;
        Ok(self.layers.remove(index))
    }

    /// Layer names, innermost first.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Byte order for payload streams built from decoded packets.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Serialize `packet` and run it through every layer, innermost first.
    pub fn encode(&self, packet: &Packet, state: &mut SessionState) -> Result<Vec<u8>> {
        let mut data = packet.to_bytes();
        for (stage, layer) in self.layers.iter().enumerate() {
            data = layer.encode(data, &mut state.context(stage))?;
        }
        Ok(data)
    }

    /// Decode one packet from the front of `raw`.
    ///
    /// With no layers the whole input is one packet. Otherwise the outermost
    /// layer delimits a unit and the remaining layers unwrap it in reverse
    /// order. Any error means the connection's byte stream can no longer be
    /// trusted.
    pub fn decode(&self, raw: &[u8], state: &mut SessionState) -> Result<StackDecode> {
        let session = state.session();
        let Some((outer, inner)) = self.layers.split_last() else {
            let packet = Packet::from_bytes(session, raw)?;
            return Ok(StackDecode::Packet {
                packet,
                consumed: raw.len(),
            });
        };

        let (mut data, consumed) = match outer.decode(raw, &mut state.context(inner.len()))? {
            Decoded::Frame { data, consumed } => (data, consumed),
            Decoded::Incomplete { needed } => {
                trace!(%session, have = raw.len(), ?needed, "waiting for more input");
                return Ok(StackDecode::Incomplete { needed });
            }
        };

        for (stage, layer) in inner.iter().enumerate().rev() {
            data = match layer.decode(&data, &mut state.context(stage))? {
                Decoded::Frame {
                    data: unwrapped,
                    consumed,
                } if consumed == data.len() => unwrapped,
                Decoded::Frame { consumed, .. } => {
                    return Err(Error::protocol(
                        layer.name(),
                        codes::TRAILING_BYTES,
                        format!("consumed {consumed} of {} bytes", data.len()),
                    ))
                }
                Decoded::Incomplete { .. } => {
                    return Err(Error::protocol(
                        layer.name(),
                        codes::TRUNCATED,
                        "unit ended before the layer's data",
                    ))
                }
            };
        }

        let packet = Packet::from_bytes(session, &data)?;
        Ok(StackDecode::Packet { packet, consumed })
    }
}

impl std::fmt::Debug for ProtocolStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolStack")
            .field("layers", &self.layer_names())
            .field("endian", &self.endian)
            .finish()
    }
}
