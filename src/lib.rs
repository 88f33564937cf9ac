//! # Service Runtime
//!
//! A network-service runtime: register event handlers ("facades") on a
//! service, attach a layered wire protocol, and let the service exchange
//! packets with I/O threads at a bounded update rate.
//!
//! ## Architecture
//! ```text
//!  I/O threads                       logic thread (one per service)
//!  -----------                       ------------------------------
//!  raw bytes --push_inbound--> [inbound queue] --drain--> ProtocolStack::decode
//!                                                          |
//!                                                          v
//!                                                 Facade::on_data_arrival
//!                                                          |
//!  transmit <--try_pop_outbound-- [outbound queue] <-- ProtocolStack::encode
//! ```
//!
//! ## Modules
//! - [`core`]: byte streams, message blocks, queues, packets
//! - [`protocol`]: layer contract, stack and built-in layers
//! - [`service`]: facades, the update scheduler and its handles
//! - [`transport`]: tokio adapter feeding byte streams into a service
//! - [`runtime`]: explicit process-wide initialization and teardown
//! - [`config`], [`error`], [`utils`]: ambient support

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::RuntimeConfig;
pub use crate::core::block::{BlockKind, MessageBlock, SessionId};
pub use crate::core::packet::Packet;
pub use crate::core::queue::MessageQueue;
pub use crate::core::stream::{Endian, Stream, Streamable};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::protocol::{ProtocolLayer, ProtocolStack};
pub use crate::runtime::Runtime;
pub use crate::service::{
    Facade, FacadeEvents, Service, ServiceBuilder, ServiceContext, ServiceHandle, ServiceKind,
    ServiceState,
};
pub use crate::utils::TimeSpan;
