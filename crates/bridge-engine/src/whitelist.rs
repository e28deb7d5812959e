//! Push-event whitelist.
//!
//! Only whitelisted switch addresses may drive the push-confirm pipeline.
//! The backing set swaps atomically on reload. When the set is empty the
//! strict flag decides: strict denies everything, permissive allows
//! everything.

use crate::error::BridgeResult;
use qlink_protocol::SwitchAddress;
use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;

/// Whitelist of push-eligible switch addresses.
pub struct Whitelist {
    set: RwLock<HashSet<SwitchAddress>>,
    strict: bool,
}

impl Whitelist {
    pub fn new(strict: bool) -> Self {
        Self {
            set: RwLock::new(HashSet::new()),
            strict,
        }
    }

    pub fn contains(&self, addr: &SwitchAddress) -> bool {
        let set = self.set.read().unwrap();
        if set.is_empty() {
            return !self.strict;
        }
        set.contains(addr)
    }

    /// Atomically swaps the backing set.
    pub fn replace(&self, entries: HashSet<SwitchAddress>) {
        let count = entries.len();
        *self.set.write().unwrap() = entries;
        info!(count, "Whitelist replaced");
    }

    /// Reloads from a JSON file: an array of `{master, station, button}`
    /// objects. Returns the entry count.
    pub fn load_from_path(&self, path: &Path) -> BridgeResult<usize> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<SwitchAddress> = serde_json::from_str(&content)?;
        let set: HashSet<SwitchAddress> = entries.into_iter().collect();
        let count = set.len();
        self.replace(set);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.set.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current entries, sorted for stable output.
    pub fn snapshot(&self) -> Vec<SwitchAddress> {
        let mut entries: Vec<_> = self.set.read().unwrap().iter().copied().collect();
        entries.sort_by_key(|a| (a.master, a.station, a.button));
        entries
    }
}
