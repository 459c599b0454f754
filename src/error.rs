//! Error types for the IRC client engine.
//!
//! This module defines the synchronous error taxonomy: connection-state
//! misuse, malformed configuration, and transport failures. Errors raised
//! inside the read/write loops never escape as panics; they are converted
//! into a single [`EngineEvent::NetworkError`](crate::event::EngineEvent)
//! notification and the affected loop stops.

use thiserror::Error;

/// Convenience type alias for Results using [`EngineError`].
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Top-level engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// `connect` was called on a session that is not disconnected.
    #[error("already connected")]
    AlreadyConnected,

    /// A send was attempted while no transport is attached.
    #[error("not connected")]
    NotConnected,

    /// The server address string could not be parsed.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// An unterminated line exceeded the read buffer capacity.
    #[error("line too long: {0} bytes without terminator")]
    LineTooLong(usize),

    /// A channel with the same name already exists in the collection.
    #[error("duplicate channel: {0}")]
    DuplicateChannel(String),

    /// `join` was called on a collection not owned by the local session.
    #[error("join is only valid on the local session's channel collection")]
    ForeignCollection,

    /// The hostname is not a valid TLS server name.
    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// I/O error during connect, read, or write.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::LineTooLong(8192);
        assert_eq!(
            format!("{}", err),
            "line too long: 8192 bytes without terminator"
        );

        let err = EngineError::InvalidAddress("a:b:c".to_string());
        assert_eq!(format!("{}", err), "invalid server address: a:b:c");
    }

    #[test]
    fn test_error_conversion() {
        let io_err =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let engine_err: EngineError = io_err.into();

        match engine_err {
            EngineError::Io(_) => {}
            _ => panic!("Expected Io variant"),
        }
    }
}
