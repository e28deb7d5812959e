//! The protocol bridge engine.
//!
//! Many parallel clients, one slow controller, one TCP socket. The engine
//! multiplexes arbitrary client operations onto the single session while
//! keeping the controller happy: writes are paced with a minimum gap,
//! identical reads are coalesced, replies are matched back to their
//! requesters, and unsolicited press events become authoritative state only
//! after a confirming read.
//!
//! # Core Invariants
//!
//! 1. **Single writer, paced**: one pumper task owns the socket write side;
//!    consecutive writes are separated by at least the configured gap.
//! 2. **No lost replies**: an operation registers its awaiter before its
//!    command is written, so a fast reply cannot slip past registration.
//! 3. **Awaiters never leak**: every awaiter resolves with a raw reply line,
//!    rejects on its deadline, or rejects when the session tears down.
//! 4. **Cache time moves forward**: a newer record is never overwritten by
//!    an older one.
//! 5. **Push state is earned**: only the push pipeline writes push state,
//!    and only after a successful confirm read.

pub mod awaiter;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod push;
pub mod queue;
pub mod whitelist;

#[cfg(test)]
mod tests;

pub use awaiter::{AwaitKey, AwaiterRegistry};
pub use bridge::{Bridge, BridgeStatus};
pub use cache::{LoadCache, LoadRecord, PushState, PushStateMap, SwitchCache, SwitchRecord, SwitchSource};
pub use config::BridgeConfig;
pub use dispatcher::{
    CacheState, Dispatcher, FadeSpec, LoadReading, LoadSetOutcome, RawSendOptions, RawSendOutcome,
    ReadOptions, SwitchReading, SwitchWriteOutcome,
};
pub use error::{BridgeError, BridgeResult};
pub use push::PushPipeline;
pub use queue::{SendQueue, PRIORITY_RAW, PRIORITY_READ, PRIORITY_WRITE};
pub use whitelist::Whitelist;
