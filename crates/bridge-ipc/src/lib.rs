//! IPC surface for the bridge daemon.
//!
//! A JSON-RPC-like protocol over a Unix domain socket, one JSON document per
//! line. This is the seam the external HTTP router consumes; the router maps
//! methods to its paths and copies the `http_status` hint out of error data.
//! There is no subscription or streaming support: clients poll.

pub mod error;
pub mod protocol;
pub mod server;

pub use error::{IpcError, IpcResult};
pub use protocol::{error_codes, ErrorInfo, Method, Request, Response};
pub use server::{IpcClient, IpcServer};
