//! Bridge configuration.
//!
//! Loaded from a JSON file when one is given, with defaults for everything
//! and a small set of runtime environment overrides for the timing knobs.

use crate::error::BridgeResult;
use qlink_protocol::{LineEnding, DEFAULT_HANDSHAKE};
use qlink_session::ConnectTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default minimum gap between controller writes.
pub const DEFAULT_MIN_GAP_MS: u64 = 120;

/// Default freshness window applied when a caller omits `cache_ms`; matches
/// the hub's polling floor.
pub const DEFAULT_MIN_POLL_INTERVAL_MS: u64 = 400;

/// Window during which push-derived state is served without a new read.
pub const DEFAULT_PUSH_FRESH_MS: u64 = 10_000;

/// Debounce before confirming a press event (v=1).
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Confirm delay for release events (v=0); releases should reach the UI fast.
pub const RELEASE_CONFIRM_DELAY_MS: u64 = 60;

/// Deadline for the confirm read a push event triggers.
pub const CONFIRM_MAX_MS: u64 = 2_000;

/// Floor applied to caller-supplied awaiter deadlines.
pub const AWAIT_FLOOR_MS: u64 = 50;

/// Awaiter deadline when the caller gives none.
pub const AWAIT_DEFAULT_MS: u64 = 2_000;

/// Main bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Controller endpoints, selectable by index.
    #[serde(default)]
    pub servers: Vec<ConnectTarget>,

    /// Handshake written once after connect; empty disables it.
    #[serde(default = "default_handshake")]
    pub handshake: String,

    /// Terminator for outbound command lines.
    #[serde(default)]
    pub line_ending: LineEnding,

    /// Minimum gap between completed controller writes, in milliseconds.
    #[serde(default = "default_min_gap_ms")]
    pub min_gap_ms: u64,

    /// Default read freshness window when the caller omits one.
    #[serde(default = "default_min_poll_interval_ms")]
    pub min_poll_interval_ms: u64,

    /// Push-state freshness window.
    #[serde(default = "default_push_fresh_ms")]
    pub push_fresh_ms: u64,

    /// One further handshake write after this many milliseconds; 0 disables.
    #[serde(default)]
    pub handshake_retry_ms: u64,

    /// Empty-whitelist policy: true denies all, false allows all.
    #[serde(default = "default_true")]
    pub whitelist_strict: bool,

    /// Fade applied to load writes when the caller leaves it unspecified.
    #[serde(default = "default_load_fade_seconds")]
    pub default_load_fade_seconds: f32,

    /// Per-key awaiter cap for switch reads.
    #[serde(default = "default_awaiters_max")]
    pub awaiters_max_per_key: usize,

    /// Per-key awaiter cap for load operations.
    #[serde(default = "default_awaiters_max")]
    pub load_awaiters_max_per_key: usize,

    /// Connect at startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Which server index the supervisor connects to.
    #[serde(default)]
    pub auto_connect_index: usize,

    /// Reconnect delay after a disconnect; 0 disables reconnecting.
    #[serde(default = "default_auto_connect_retry_ms")]
    pub auto_connect_retry_ms: u64,

    /// Debounce before confirming a press event.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Cap on the debug receive ring.
    #[serde(default = "default_recv_ring_max")]
    pub recv_ring_max: usize,

    /// JSON whitelist file consumed by `whitelist.reload`.
    #[serde(default)]
    pub whitelist_path: Option<PathBuf>,
}

fn default_handshake() -> String {
    DEFAULT_HANDSHAKE.to_string()
}

fn default_min_gap_ms() -> u64 {
    DEFAULT_MIN_GAP_MS
}

fn default_min_poll_interval_ms() -> u64 {
    DEFAULT_MIN_POLL_INTERVAL_MS
}

fn default_push_fresh_ms() -> u64 {
    DEFAULT_PUSH_FRESH_MS
}

fn default_true() -> bool {
    true
}

fn default_load_fade_seconds() -> f32 {
    3.0
}

fn default_awaiters_max() -> usize {
    200
}

fn default_auto_connect_retry_ms() -> u64 {
    5_000
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_recv_ring_max() -> usize {
    32 * 1024
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            handshake: default_handshake(),
            line_ending: LineEnding::default(),
            min_gap_ms: default_min_gap_ms(),
            min_poll_interval_ms: default_min_poll_interval_ms(),
            push_fresh_ms: default_push_fresh_ms(),
            handshake_retry_ms: 0,
            whitelist_strict: true,
            default_load_fade_seconds: default_load_fade_seconds(),
            awaiters_max_per_key: default_awaiters_max(),
            load_awaiters_max_per_key: default_awaiters_max(),
            auto_connect: true,
            auto_connect_index: 0,
            auto_connect_retry_ms: default_auto_connect_retry_ms(),
            debounce_ms: default_debounce_ms(),
            recv_ring_max: default_recv_ring_max(),
            whitelist_path: None,
        }
    }
}

impl BridgeConfig {
    /// Loads from a file if given, otherwise defaults; environment overrides
    /// are applied last either way.
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.load_from_env();
        Ok(config)
    }

    /// Loads configuration from a specific JSON file.
    pub fn load_from_file(path: &Path) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override the timing knobs from environment variables.
    fn load_from_env(&mut self) {
        if let Some(v) = env_u64("QLINK_MIN_GAP_MS") {
            self.min_gap_ms = v;
        }
        if let Some(v) = env_u64("QLINK_PUSH_FRESH_MS") {
            self.push_fresh_ms = v;
        }
        if let Some(v) = env_u64("QLINK_DEBOUNCE_MS") {
            self.debounce_ms = v;
        }
        if let Some(v) = env_u64("QLINK_AUTO_CONNECT_RETRY_MS") {
            self.auto_connect_retry_ms = v;
        }
        if let Ok(v) = std::env::var("QLINK_WHITELIST_STRICT") {
            if let Ok(b) = v.parse::<bool>() {
                self.whitelist_strict = b;
            }
        }
    }

    pub fn min_gap(&self) -> Duration {
        Duration::from_millis(self.min_gap_ms)
    }

    pub fn push_fresh(&self) -> Duration {
        Duration::from_millis(self.push_fresh_ms)
    }

    pub fn handshake_retry(&self) -> Option<Duration> {
        (self.handshake_retry_ms > 0).then(|| Duration::from_millis(self.handshake_retry_ms))
    }

    pub fn auto_connect_retry(&self) -> Option<Duration> {
        (self.auto_connect_retry_ms > 0).then(|| Duration::from_millis(self.auto_connect_retry_ms))
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
