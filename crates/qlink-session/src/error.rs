//! Error types for the session crate.

use thiserror::Error;

/// Session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No connection is established.
    #[error("not connected to a controller")]
    NotConnected,

    /// TCP connect did not complete within the deadline.
    #[error("connect to {0} timed out after {1} ms")]
    ConnectTimeout(String, u64),

    /// IO error on the socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
