//! The priority-ordered, rate-limited send queue.
//!
//! A single pumper task owns all controller writes. It waits out the
//! inter-write gap first and only then pops the highest-priority oldest
//! item, so a high-priority submission that arrives during the gap still
//! wins the slot. `last_send` is stamped when the write returns, success or
//! failure, which keeps failed writes from compressing the gap.

use crate::error::{BridgeError, BridgeResult};
use qlink_session::{Session, SessionError};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Switch and load writes.
pub const PRIORITY_WRITE: i32 = 10;
/// Raw pass-through sends.
pub const PRIORITY_RAW: i32 = 5;
/// Reads, including push-confirm reads.
pub const PRIORITY_READ: i32 = 0;

struct QueuedSend {
    bytes: Vec<u8>,
    priority: i32,
    seq: u64,
    label: String,
    done: oneshot::Sender<Result<(), SessionError>>,
}

impl PartialEq for QueuedSend {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedSend {}

impl PartialOrd for QueuedSend {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedSend {
    /// Max-heap on priority, oldest first within a priority.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The send queue and its pacing state.
pub struct SendQueue {
    heap: Mutex<BinaryHeap<QueuedSend>>,
    notify: Notify,
    min_gap: Duration,
    last_send: Mutex<Option<Instant>>,
    seq: AtomicU64,
}

impl SendQueue {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            min_gap,
            last_send: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Enqueues a write and awaits its completion.
    pub async fn submit(&self, bytes: Vec<u8>, priority: i32, label: &str) -> BridgeResult<()> {
        let (done, done_rx) = oneshot::channel();
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        trace!(label, priority, seq, "Enqueueing send");

        self.heap.lock().unwrap().push(QueuedSend {
            bytes,
            priority,
            seq,
            label: label.to_string(),
            done,
        });
        self.notify.notify_one();

        match done_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(SessionError::NotConnected)) => Err(BridgeError::NotConnected),
            Ok(Err(e)) => {
                warn!(label, error = %e, "Write failed");
                Err(BridgeError::Disconnected)
            }
            Err(_) => Err(BridgeError::Internal("send pumper gone".to_string())),
        }
    }

    pub fn depth(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    /// Spawns the single pumper task.
    pub fn start(self: &Arc<Self>, session: Arc<Session>) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            queue.run(session).await;
        })
    }

    async fn run(&self, session: Arc<Session>) {
        loop {
            // Wait until something is queued.
            while self.heap.lock().unwrap().is_empty() {
                self.notify.notified().await;
            }

            // Wait out the gap before choosing what to send; anything that
            // arrives meanwhile competes for the slot.
            let wait_until = self
                .last_send
                .lock()
                .unwrap()
                .map(|last| last + self.min_gap);
            if let Some(deadline) = wait_until {
                let now = Instant::now();
                if deadline > now {
                    tokio::time::sleep(deadline - now).await;
                }
            }

            let item = { self.heap.lock().unwrap().pop() };
            let Some(item) = item else { continue };

            debug!(label = %item.label, priority = item.priority, "Sending");
            let result = session.write(&item.bytes).await.map_err(|e| {
                warn!(label = %item.label, error = %e, "Controller write failed");
                e
            });
            *self.last_send.lock().unwrap() = Some(Instant::now());
            let _ = item.done.send(result);
        }
    }
}
