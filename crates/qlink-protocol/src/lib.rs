//! Qlink controller wire protocol: addresses, commands, framing, and reply
//! classification.
//!
//! The controller speaks an ASCII, line-oriented protocol over a single TCP
//! socket. Outbound commands are short space-separated lines; inbound traffic
//! mixes addressed replies (`RGS`/`VGS`/`RLB`/`RGB`), bare `0`/`1` state
//! bytes, and unsolicited `SW` press events, sometimes several per line.
//!
//! # Core Invariants
//!
//! 1. **Lossless framing**: every maximal `\r`/`\n`/`\r\n`-terminated segment
//!    is emitted exactly once, in arrival order; empty segments are dropped.
//! 2. **Best-effort classification**: a malformed line classifies to nothing;
//!    it never produces an error that could abort the reader.
//! 3. **Case-sensitive tokens**: `RGS|VGS|RLB|RGB|SW` match exactly, with an
//!    optional trailing `#` on reply tokens.

pub mod address;
pub mod command;
pub mod error;
pub mod framer;
pub mod parser;

pub use address::{LoadAddress, SwitchAddress};
pub use command::{Command, LineEnding, DEFAULT_HANDSHAKE};
pub use error::{ProtocolError, ProtocolResult};
pub use framer::LineFramer;
pub use parser::{LoadToken, Parser, Reply, SwitchToken};
