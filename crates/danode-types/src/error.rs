use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("malformed batch header: {0}")]
    MalformedHeader(String),

    #[error("invalid operator socket {socket:?}: {reason}")]
    InvalidSocket { socket: String, reason: String },
}
