//! # Error Types
//!
//! Error handling for the service runtime.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! carries both a machine-checkable [`ErrorKind`] and a human-readable message.
//!
//! ## Error Categories
//! - **Limit**: stream or queue bounds violated (read past end, bad length header)
//! - **Protocol**: a protocol layer rejected malformed or corrupt input
//! - **NotImplemented**: a data shape the stream cannot produce
//! - **NotFound**: a requested handler, layer, timer or session is absent
//! - **State**: a lifecycle operation was attempted in the wrong service state
//!
//! ## Example Usage
//! ```rust
//! use service_runtime::core::stream::Stream;
//! use service_runtime::error::ErrorKind;
//!
//! let mut stream = Stream::new();
//! stream.write(7u16);
//! assert_eq!(stream.read::<u16>().ok(), Some(7));
//!
//! let err = stream.read::<u32>().unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Limit);
//! ```

use std::io;
use thiserror::Error;

/// Static messages for the hot error paths.
pub mod constants {
    /// Stream errors
    pub const ERR_NOT_ENOUGH_BYTES: &str = "Not enough bytes remaining in stream";
    pub const ERR_NEGATIVE_LENGTH: &str = "Negative length header";
    pub const ERR_POS_OUT_OF_RANGE: &str = "Position beyond stream length";
    pub const ERR_SHRINK_REJECTED: &str = "Stream can only grow";

    /// Queue errors
    pub const ERR_QUEUE_CLOSED: &str = "Message queue closed";

    /// Framing errors
    pub const ERR_BAD_MAGIC: &str = "Frame magic mismatch";
    pub const ERR_OVERSIZED_FRAME: &str = "Frame exceeds maximum size";

    /// Sequence errors
    pub const ERR_SEQUENCE_GAP: &str = "Frame sequence gap or replay";

    /// Facade errors
    pub const ERR_FACADE_PANICKED: &str = "Facade callback panicked";
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Limit,
    Protocol,
    NotImplemented,
    NotFound,
    InvalidData,
    InvalidState,
    Facade,
    Config,
    Io,
    Closed,
}

// Error is the primary error type for all runtime operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Limit error: {0}")]
    Limit(String),

    #[error("Protocol error in layer '{layer}' (code {code}): {message}")]
    Protocol {
        layer: &'static str,
        code: u16,
        message: String,
    },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Cannot {operation} while service is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Facade error: {0}")]
    Facade(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Message queue closed")]
    QueueClosed,
}

impl Error {
    /// Build a protocol error tagged with the rejecting layer.
    pub fn protocol(layer: &'static str, code: u16, message: impl Into<String>) -> Self {
        Error::Protocol {
            layer,
            code,
            message: message.into(),
        }
    }

    pub fn limit(message: impl Into<String>) -> Self {
        Error::Limit(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Limit(_) => ErrorKind::Limit,
            Error::Protocol { .. }
            | Error::CompressionFailure
            | Error::DecompressionFailure
            | Error::EncryptionFailure
            | Error::DecryptionFailure => ErrorKind::Protocol,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidData(_) | Error::Serialization(_) => ErrorKind::InvalidData,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::Facade(_) => ErrorKind::Facade,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::QueueClosed => ErrorKind::Closed,
        }
    }

    /// Name of the protocol layer that produced this error, if any.
    pub fn layer(&self) -> Option<&'static str> {
        match self {
            Error::Protocol { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

/// Type alias for Results using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::limit("x").kind(), ErrorKind::Limit);
        assert_eq!(
            Error::protocol("framing", 1, "bad").kind(),
            ErrorKind::Protocol
        );
        assert_eq!(Error::DecompressionFailure.kind(), ErrorKind::Protocol);
        assert_eq!(Error::NotFound("t".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::QueueClosed.kind(), ErrorKind::Closed);
    }

    #[test]
    fn test_protocol_error_carries_layer() {
        let err = Error::protocol("sequence", 7, "gap");
        assert_eq!(err.layer(), Some("sequence"));
        assert!(err.to_string().contains("sequence"));
        assert!(err.to_string().contains("code 7"));
        assert_eq!(Error::limit("x").layer(), None);
    }
}
