//! Error taxonomy for bridge operations.
//!
//! Every error maps to the HTTP status the external router should answer
//! with; the mapping lives here so the router needs no knowledge of the
//! taxonomy.

use qlink_protocol::ProtocolError;
use qlink_session::SessionError;
use thiserror::Error;

/// Bridge error type.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// An operation required a session and none was up.
    #[error("not connected to a controller")]
    NotConnected,

    /// Bad address, out-of-range parameter, or unknown command token.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The per-key awaiter cap was reached.
    #[error("awaiter list for {key} is saturated")]
    AwaitersSaturated { key: String },

    /// The awaiter deadline elapsed without a matching reply.
    #[error("no reply within {ms} ms")]
    Timeout { ms: u64 },

    /// A pending operation was rejected by session teardown.
    #[error("session disconnected while waiting")]
    Disconnected,

    /// Session-level failure (connect, socket options).
    #[error("session error: {0}")]
    Session(SessionError),

    /// IO error outside the session (whitelist file, config file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a config or whitelist file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal wiring failure; should not happen in normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// HTTP status the external router answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::NotConnected | BridgeError::InvalidInput(_) => 400,
            BridgeError::AwaitersSaturated { .. } => 429,
            BridgeError::Timeout { .. } | BridgeError::Disconnected => 504,
            BridgeError::Session(SessionError::NotConnected) => 400,
            _ => 500,
        }
    }

    /// Whether serving a stale cache record instead is permitted.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout { .. } | BridgeError::Disconnected | BridgeError::NotConnected
        )
    }
}

impl From<ProtocolError> for BridgeError {
    fn from(e: ProtocolError) -> Self {
        BridgeError::InvalidInput(e.to_string())
    }
}

impl From<SessionError> for BridgeError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotConnected => BridgeError::NotConnected,
            other => BridgeError::Session(other),
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
