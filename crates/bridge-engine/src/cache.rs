//! State caches: switch records, load records, push-derived state.
//!
//! Entries are created on first observation and overwritten in place. There
//! is no eviction; freshness is judged at read time. Inserts carry their own
//! timestamps and an older insert never displaces a newer record.

use qlink_protocol::{LoadAddress, LoadToken, SwitchAddress};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Where a switch value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchSource {
    /// Resolved live from an awaited reply.
    TcpAwait,
    /// Served from the cache.
    Cache,
    /// Served from push-confirmed state.
    PushState,
    /// An addressed `RGS` reply.
    Rgs,
    /// An addressed `VGS` reply.
    Vgs,
    /// A bare `0`/`1` attributed via the FIFO.
    Bare,
}

impl SwitchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchSource::TcpAwait => "tcp-await",
            SwitchSource::Cache => "cache",
            SwitchSource::PushState => "push-state",
            SwitchSource::Rgs => "RGS",
            SwitchSource::Vgs => "VGS",
            SwitchSource::Bare => "bare",
        }
    }
}

/// One observed switch state.
#[derive(Debug, Clone)]
pub struct SwitchRecord {
    pub value: u8,
    pub raw: String,
    pub ts: Instant,
    pub bytes: usize,
    pub source: SwitchSource,
}

/// Switch state cache keyed by address.
#[derive(Default)]
pub struct SwitchCache {
    entries: Mutex<HashMap<SwitchAddress, SwitchRecord>>,
}

impl SwitchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unless an entry with a newer timestamp is already present.
    /// Returns whether the record was stored.
    pub fn insert(&self, addr: SwitchAddress, record: SwitchRecord) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(&addr) {
            if existing.ts > record.ts {
                return false;
            }
        }
        entries.insert(addr, record);
        true
    }

    pub fn get(&self, addr: &SwitchAddress) -> Option<SwitchRecord> {
        self.entries.lock().unwrap().get(addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One observed load level.
#[derive(Debug, Clone)]
pub struct LoadRecord {
    pub level: u8,
    pub fade: Option<f32>,
    pub raw: String,
    pub ts: Instant,
    pub bytes: usize,
    pub source: LoadToken,
}

/// Load level cache keyed by address.
#[derive(Default)]
pub struct LoadCache {
    entries: Mutex<HashMap<LoadAddress, LoadRecord>>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: LoadAddress, record: LoadRecord) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(&addr) {
            if existing.ts > record.ts {
                return false;
            }
        }
        entries.insert(addr, record);
        true
    }

    pub fn get(&self, addr: &LoadAddress) -> Option<LoadRecord> {
        self.entries.lock().unwrap().get(addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Push-confirmed state for one switch.
#[derive(Debug, Clone, Copy)]
pub struct PushState {
    pub value: u8,
    pub ts: Instant,
}

/// Push-confirmed state map.
///
/// Written only by the push pipeline, after a successful confirm read.
#[derive(Default)]
pub struct PushStateMap {
    entries: Mutex<HashMap<SwitchAddress, PushState>>,
}

impl PushStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: SwitchAddress, state: PushState) {
        self.entries.lock().unwrap().insert(addr, state);
    }

    pub fn get(&self, addr: &SwitchAddress) -> Option<PushState> {
        self.entries.lock().unwrap().get(addr).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(value: u8, ts: Instant) -> SwitchRecord {
        SwitchRecord {
            value,
            raw: format!("RGS# 1 2 3 {}", value),
            ts,
            bytes: 13,
            source: SwitchSource::Rgs,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = SwitchCache::new();
        let addr = SwitchAddress::new(1, 2, 3);
        assert!(cache.get(&addr).is_none());

        assert!(cache.insert(addr, record(1, Instant::now())));
        let rec = cache.get(&addr).unwrap();
        assert_eq!(rec.value, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_older_insert_rejected() {
        let cache = SwitchCache::new();
        let addr = SwitchAddress::new(1, 2, 3);
        let now = Instant::now();
        let earlier = now - Duration::from_secs(5);

        assert!(cache.insert(addr, record(1, now)));
        assert!(!cache.insert(addr, record(0, earlier)));
        assert_eq!(cache.get(&addr).unwrap().value, 1);
    }

    #[test]
    fn test_equal_timestamp_overwrites() {
        // The most recently observed reply wins, ties included.
        let cache = SwitchCache::new();
        let addr = SwitchAddress::new(1, 2, 3);
        let ts = Instant::now();
        assert!(cache.insert(addr, record(0, ts)));
        assert!(cache.insert(addr, record(1, ts)));
        assert_eq!(cache.get(&addr).unwrap().value, 1);
    }

    #[test]
    fn test_load_cache_monotonic() {
        let cache = LoadCache::new();
        let addr = LoadAddress::new(3, 1, 1, 2).unwrap();
        let now = Instant::now();

        let rec = |level: u8, ts: Instant| LoadRecord {
            level,
            fade: Some(3.0),
            raw: String::new(),
            ts,
            bytes: 0,
            source: LoadToken::Rlb,
        };

        assert!(cache.insert(addr, rec(75, now)));
        assert!(!cache.insert(addr, rec(10, now - Duration::from_secs(1))));
        assert_eq!(cache.get(&addr).unwrap().level, 75);
    }

    #[test]
    fn test_push_state_map() {
        let map = PushStateMap::new();
        let addr = SwitchAddress::new(2, 20, 7);
        assert!(map.get(&addr).is_none());

        map.insert(
            addr,
            PushState {
                value: 1,
                ts: Instant::now(),
            },
        );
        assert_eq!(map.get(&addr).unwrap().value, 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_source_strings() {
        assert_eq!(SwitchSource::TcpAwait.as_str(), "tcp-await");
        assert_eq!(SwitchSource::PushState.as_str(), "push-state");
        assert_eq!(SwitchSource::Rgs.as_str(), "RGS");
        assert_eq!(SwitchSource::Bare.as_str(), "bare");
    }
}
