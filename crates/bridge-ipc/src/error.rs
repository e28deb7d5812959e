//! Error types for the IPC crate.

use thiserror::Error;

/// IPC error type.
#[derive(Error, Debug)]
pub enum IpcError {
    /// IO error on the socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket setup or connect failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// JSON serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer closed the connection mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
