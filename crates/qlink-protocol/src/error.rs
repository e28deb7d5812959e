//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An address component is outside its allowed range.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A command parameter is outside its allowed range.
    #[error("invalid command parameter: {0}")]
    InvalidParameter(String),

    /// An address string could not be parsed.
    #[error("malformed address string: {0:?}")]
    MalformedAddress(String),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
