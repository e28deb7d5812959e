//! Reply awaiters: per-key waiter lists and the bare-reply FIFO.
//!
//! An awaiter is a one-shot channel waiting for the raw reply line matching
//! its key. Registration happens before the command is written, so a reply
//! cannot race past it. A matching reply resolves every waiter on the key at
//! once; a deadline rejects with `Timeout`; session teardown rejects
//! everything with `Disconnected`.
//!
//! The bare FIFO records which switch addresses might be answered with a
//! lone `0`/`1` carrying no address; the oldest outstanding entry claims
//! such a reply.

use crate::config::AWAIT_FLOOR_MS;
use crate::error::{BridgeError, BridgeResult};
use qlink_protocol::{LoadAddress, SwitchAddress};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::trace;

/// Key a reply is matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AwaitKey {
    Switch(SwitchAddress),
    Load(LoadAddress),
}

impl AwaitKey {
    pub fn key_string(&self) -> String {
        match self {
            AwaitKey::Switch(sa) => sa.key(),
            AwaitKey::Load(la) => la.key(),
        }
    }
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<String>,
}

/// A registered awaiter, redeemed through [`AwaiterRegistry::wait`].
pub struct PendingReply {
    key: AwaitKey,
    id: u64,
    rx: oneshot::Receiver<String>,
}

/// Registry of in-flight reply waiters.
pub struct AwaiterRegistry {
    waiters: Mutex<HashMap<AwaitKey, Vec<Waiter>>>,
    bare_fifo: Mutex<VecDeque<SwitchAddress>>,
    next_id: AtomicU64,
    switch_cap: usize,
    load_cap: usize,
}

impl AwaiterRegistry {
    pub fn new(switch_cap: usize, load_cap: usize) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            bare_fifo: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            switch_cap,
            load_cap,
        }
    }

    /// Registers a waiter, failing fast at the per-key cap.
    pub fn register(&self, key: AwaitKey) -> BridgeResult<PendingReply> {
        let cap = match key {
            AwaitKey::Switch(_) => self.switch_cap,
            AwaitKey::Load(_) => self.load_cap,
        };

        let mut waiters = self.waiters.lock().unwrap();
        let list = waiters.entry(key).or_default();
        if list.len() >= cap {
            return Err(BridgeError::AwaitersSaturated {
                key: key.key_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        list.push(Waiter { id, tx });
        Ok(PendingReply { key, id, rx })
    }

    /// Awaits the reply with a deadline (floored at 50 ms).
    ///
    /// On timeout the waiter removes itself; on sender drop (teardown) the
    /// result is `Disconnected`.
    pub async fn wait(&self, pending: PendingReply, max: Duration) -> BridgeResult<String> {
        let max = max.max(Duration::from_millis(AWAIT_FLOOR_MS));
        match timeout(max, pending.rx).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                self.remove(pending.key, pending.id);
                Err(BridgeError::Timeout {
                    ms: max.as_millis() as u64,
                })
            }
        }
    }

    /// Drops a registered waiter without waiting (write failed before send).
    pub fn abandon(&self, pending: PendingReply) {
        self.remove(pending.key, pending.id);
    }

    /// Resolves and drains every waiter on the key. Returns how many.
    pub fn resolve(&self, key: AwaitKey, raw: &str) -> usize {
        let drained = {
            let mut waiters = self.waiters.lock().unwrap();
            waiters.remove(&key).unwrap_or_default()
        };
        let count = drained.len();
        for waiter in drained {
            let _ = waiter.tx.send(raw.to_string());
        }
        if count > 0 {
            trace!(key = %key.key_string(), count, "Resolved awaiters");
        }
        count
    }

    /// Rejects everything and clears the bare FIFO. Called on teardown.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = {
            let mut waiters = self.waiters.lock().unwrap();
            waiters.drain().collect()
        };
        // Dropping the senders rejects the receivers with `Disconnected`.
        drop(drained);
        self.bare_fifo.lock().unwrap().clear();
    }

    /// Appends an address to the bare-reply FIFO.
    pub fn push_bare(&self, addr: SwitchAddress) {
        self.bare_fifo.lock().unwrap().push_back(addr);
    }

    /// Pops the oldest bare-eligible address, if any.
    pub fn pop_bare(&self) -> Option<SwitchAddress> {
        self.bare_fifo.lock().unwrap().pop_front()
    }

    /// Removes the first FIFO occurrence of the address, if present. Called
    /// when an addressed reply or a timeout settles the request.
    pub fn remove_bare(&self, addr: &SwitchAddress) {
        let mut fifo = self.bare_fifo.lock().unwrap();
        if let Some(pos) = fifo.iter().position(|a| a == addr) {
            fifo.remove(pos);
        }
    }

    pub fn pending_count(&self, key: &AwaitKey) -> usize {
        self.waiters
            .lock()
            .unwrap()
            .get(key)
            .map_or(0, |list| list.len())
    }

    pub fn bare_len(&self) -> usize {
        self.bare_fifo.lock().unwrap().len()
    }

    fn remove(&self, key: AwaitKey, id: u64) {
        let mut waiters = self.waiters.lock().unwrap();
        if let Some(list) = waiters.get_mut(&key) {
            list.retain(|w| w.id != id);
            if list.is_empty() {
                waiters.remove(&key);
            }
        }
    }
}
