//! # Core Data Types
//!
//! Byte streams, message blocks, the cross-thread queue and decoded packets.
//!
//! ## Components
//! - **Stream**: endian-aware typed read/write over a growable buffer
//! - **MessageBlock**: ownership-transferring envelope around a payload
//! - **MessageQueue**: MPMC FIFO that moves blocks between threads
//! - **Packet**: opcode plus payload produced by the protocol stack
//!
//! ## Packet Layout
//! ```text
//! [Opcode(4, BE)] [Payload(N)]
//! ```

pub mod block;
pub mod packet;
pub mod queue;
pub mod stream;
