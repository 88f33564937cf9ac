//! # Utility Modules
//!
//! Supporting utilities for compression, cryptography, logging, metrics and
//! time spans.
//!
//! ## Components
//! - **Compression**: LZ4 and Zstd with thresholds and output limits
//! - **Crypto**: XChaCha20-Poly1305 AEAD sealing
//! - **Logging**: subscriber setup and the diagnostic sink with stderr fallback
//! - **Metrics**: atomic per-service counters
//! - **TimeSpan**: signed microsecond spans for scheduling math

pub mod compression;
pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod time_span;

pub use time_span::TimeSpan;
