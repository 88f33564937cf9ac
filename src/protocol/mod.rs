//! # Protocol Stack
//!
//! Turns raw connection bytes into [`Packet`](crate::core::packet::Packet)s
//! and back through an ordered list of layers.
//!
//! ## Components
//! - **Layer**: the per-stage transform contract and per-connection state
//! - **Stack**: ordered composition, built by hand or from `StackConfig`
//! - **Framing**: magic plus length prefix, the only stream delimiter
//! - **Compression**: flagged LZ4/Zstd payload compression
//! - **Cipher**: XChaCha20-Poly1305 sealing with a random nonce per unit
//! - **Sequence**: per-connection counters that reject gaps and replays
//!
//! ## Wire Order (default configuration, outermost first)
//! ```text
//! [Framing] -> [Cipher?] -> [Compression?] -> [Sequence?] -> [Opcode(4)] [Payload]
//! ```

pub mod cipher;
pub mod compression;
pub mod framing;
pub mod layer;
pub mod sequence;
pub mod stack;

pub use layer::{Decoded, LayerContext, ProtocolLayer, SessionState};
pub use stack::{ProtocolStack, StackDecode};
