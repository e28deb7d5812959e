//! The push-confirm pipeline.
//!
//! An unsolicited `SW` event is a hint, not state: the controller sends them
//! for raw button activity, including bounces and bursts. The pipeline gates
//! events through the whitelist, debounces them per address, then issues one
//! confirming read; only a confirmed value becomes push state.
//!
//! Release events (v=0) confirm after a short 60 ms delay so the UI sees
//! switch-off quickly; press events (v=1) wait the full debounce window
//! because they tend to arrive in bursts.

use crate::cache::{PushState, PushStateMap, SwitchCache, SwitchRecord, SwitchSource};
use crate::error::BridgeResult;
use crate::whitelist::Whitelist;
use qlink_protocol::SwitchAddress;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Result of a confirm read.
#[derive(Debug, Clone)]
pub struct ConfirmedState {
    pub value: u8,
    pub raw: String,
}

/// Confirm-read capability handed to the pipeline at wiring time.
///
/// A narrow closure instead of the whole dispatcher; the dispatcher already
/// depends on state the pipeline feeds.
pub type ConfirmFn = Arc<
    dyn Fn(SwitchAddress) -> Pin<Box<dyn Future<Output = BridgeResult<ConfirmedState>> + Send>>
        + Send
        + Sync,
>;

/// Debounced push-event handler.
pub struct PushPipeline {
    whitelist: Arc<Whitelist>,
    push_state: Arc<PushStateMap>,
    switch_cache: Arc<SwitchCache>,
    timers: Mutex<HashMap<SwitchAddress, JoinHandle<()>>>,
    press_delay: Duration,
    release_delay: Duration,
    confirm: ConfirmFn,
}

impl PushPipeline {
    pub fn new(
        whitelist: Arc<Whitelist>,
        push_state: Arc<PushStateMap>,
        switch_cache: Arc<SwitchCache>,
        press_delay: Duration,
        release_delay: Duration,
        confirm: ConfirmFn,
    ) -> Self {
        Self {
            whitelist,
            push_state,
            switch_cache,
            timers: Mutex::new(HashMap::new()),
            press_delay,
            release_delay,
            confirm,
        }
    }

    /// Handles one `SW` event: gate, debounce, schedule the confirm.
    pub fn on_event(self: &Arc<Self>, addr: SwitchAddress, value: u8) {
        if !self.whitelist.contains(&addr) {
            trace!(addr = %addr, "Push event not whitelisted, dropped");
            return;
        }

        let delay = if value == 0 {
            self.release_delay
        } else {
            self.press_delay
        };
        debug!(addr = %addr, value, delay_ms = delay.as_millis() as u64, "Push event, confirm scheduled");

        let pipeline = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pipeline.run_confirm(addr).await;
        });

        // Cancel-and-replace: only the newest event's timer survives.
        let mut timers = self.timers.lock().unwrap();
        if let Some(old) = timers.insert(addr, handle) {
            old.abort();
        }
    }

    /// Cancels every pending confirm timer. Called on disconnect.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Pending confirm timers, for status output and tests.
    pub fn timer_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    async fn run_confirm(self: Arc<Self>, addr: SwitchAddress) {
        match (self.confirm)(addr).await {
            Ok(confirmed) => {
                let now = Instant::now();
                self.push_state.insert(
                    addr,
                    PushState {
                        value: confirmed.value,
                        ts: now,
                    },
                );
                self.switch_cache.insert(
                    addr,
                    SwitchRecord {
                        value: confirmed.value,
                        bytes: confirmed.raw.len(),
                        raw: confirmed.raw,
                        ts: now,
                        source: SwitchSource::PushState,
                    },
                );
                debug!(addr = %addr, value = confirmed.value, "Push state confirmed");
            }
            Err(e) => {
                // Not retried; the state simply stays as it was.
                warn!(addr = %addr, error = %e, "Push confirm failed, state untouched");
            }
        }
        self.timers.lock().unwrap().remove(&addr);
    }
}
