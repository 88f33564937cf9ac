//! # Transport
//!
//! Adapters that connect real byte streams to a service. The service core
//! never performs socket I/O itself; everything here talks to it only
//! through a [`ServiceHandle`](crate::service::ServiceHandle).

pub mod bridge;

pub use bridge::TransportBridge;
