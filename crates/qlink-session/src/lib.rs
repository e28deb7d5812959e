//! TCP session management for the single controller link.
//!
//! The controller accepts exactly one TCP connection and tolerates neither
//! pipelined writes nor idle-timeout probes, so the session layer stays
//! deliberately small: one connection, one reader task, one write primitive.
//!
//! # Core Invariants
//!
//! 1. **One connection**: connecting tears down any previous connection
//!    first; stale reader and handshake tasks are fenced off by an epoch
//!    counter.
//! 2. **Bounded receive ring**: the debug ring is pre-trimmed to its cap
//!    before every append and cleared on teardown.
//! 3. **Teardown is observable**: every close, error, or manual disconnect
//!    publishes exactly one `Disconnected` notice for the engine and the
//!    supervisor to react to.

pub mod error;
pub mod session;
pub mod supervisor;
pub mod target;

pub use error::{SessionError, SessionResult};
pub use session::{Session, SessionConfig, SessionNotice};
pub use supervisor::Supervisor;
pub use target::ConnectTarget;
