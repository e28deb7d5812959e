//! The bridge facade.
//!
//! Owns every engine structure and the wiring between them; the process
//! surface talks to a `Bridge` handle and nothing else. `start` spawns the
//! three long-lived tasks: the send pumper, the reply dispatch loop, and the
//! connection supervisor.

use crate::awaiter::{AwaitKey, AwaiterRegistry};
use crate::cache::{LoadCache, LoadRecord, PushStateMap, SwitchCache, SwitchRecord, SwitchSource};
use crate::config::{BridgeConfig, RELEASE_CONFIRM_DELAY_MS};
use crate::dispatcher::{
    Dispatcher, FadeSpec, LoadReading, LoadSetOutcome, RawSendOptions, RawSendOutcome, ReadOptions,
    SwitchReading, SwitchWriteOutcome,
};
use crate::error::{BridgeError, BridgeResult};
use crate::push::{ConfirmFn, ConfirmedState, PushPipeline};
use crate::queue::SendQueue;
use crate::whitelist::Whitelist;
use qlink_protocol::{LoadAddress, Parser, Reply, SwitchAddress, SwitchToken};
use qlink_session::{ConnectTarget, Session, SessionConfig, SessionNotice, Supervisor};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Snapshot of bridge state for status output.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub connected: bool,
    pub target: Option<String>,
    pub servers: usize,
    pub queue_depth: usize,
    pub switch_cache_entries: usize,
    pub load_cache_entries: usize,
    pub push_state_entries: usize,
    pub whitelist_entries: usize,
    pub pending_push_confirms: usize,
}

/// The assembled engine.
pub struct Bridge {
    config: BridgeConfig,
    session: Arc<Session>,
    queue: Arc<SendQueue>,
    awaiters: Arc<AwaiterRegistry>,
    switch_cache: Arc<SwitchCache>,
    load_cache: Arc<LoadCache>,
    push_state: Arc<PushStateMap>,
    whitelist: Arc<Whitelist>,
    push: Arc<PushPipeline>,
    dispatcher: Arc<Dispatcher>,
    lines: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Bridge {
    /// Wires the engine. Nothing runs until [`Bridge::start`].
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let (session, lines_rx) = Session::new(SessionConfig {
            handshake: config.handshake.clone(),
            handshake_retry: config.handshake_retry(),
            recv_ring_max: config.recv_ring_max,
        });

        let queue = Arc::new(SendQueue::new(config.min_gap()));
        let awaiters = Arc::new(AwaiterRegistry::new(
            config.awaiters_max_per_key,
            config.load_awaiters_max_per_key,
        ));
        let switch_cache = Arc::new(SwitchCache::new());
        let load_cache = Arc::new(LoadCache::new());
        let push_state = Arc::new(PushStateMap::new());

        let whitelist = Arc::new(Whitelist::new(config.whitelist_strict));
        if let Some(path) = &config.whitelist_path {
            match whitelist.load_from_path(path) {
                Ok(count) => info!(count, path = %path.display(), "Whitelist loaded"),
                Err(e) => warn!(path = %path.display(), error = %e, "Whitelist load failed"),
            }
        }

        let dispatcher = Arc::new(Dispatcher::new(
            config.clone(),
            session.clone(),
            queue.clone(),
            awaiters.clone(),
            switch_cache.clone(),
            load_cache.clone(),
            push_state.clone(),
        ));

        // The pipeline gets a confirm-read capability, not the dispatcher.
        let confirm_dispatcher = dispatcher.clone();
        let confirm: ConfirmFn = Arc::new(move |addr| {
            let dispatcher = confirm_dispatcher.clone();
            Box::pin(async move {
                let reading = dispatcher.confirm_read(addr).await?;
                Ok(ConfirmedState {
                    value: reading.value,
                    raw: reading.raw,
                })
            })
        });

        let push = Arc::new(PushPipeline::new(
            whitelist.clone(),
            push_state.clone(),
            switch_cache.clone(),
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(RELEASE_CONFIRM_DELAY_MS),
            confirm,
        ));

        Arc::new(Self {
            config,
            session,
            queue,
            awaiters,
            switch_cache,
            load_cache,
            push_state,
            whitelist,
            push,
            dispatcher,
            lines: Mutex::new(Some(lines_rx)),
        })
    }

    /// Spawns the pumper, the reply loop, and the supervisor.
    pub fn start(self: &Arc<Self>) -> BridgeResult<Vec<JoinHandle<()>>> {
        let lines = self
            .lines
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::Internal("bridge already started".to_string()))?;

        let pumper = self.queue.start(self.session.clone());

        let bridge = self.clone();
        let notices = self.session.subscribe_notices();
        let reply_loop = tokio::spawn(async move {
            bridge.reply_loop(lines, notices).await;
        });

        let supervisor = Supervisor::new(
            self.session.clone(),
            self.config.servers.clone(),
            self.config.auto_connect,
            self.config.auto_connect_index,
            self.config.auto_connect_retry(),
        )
        .start();

        Ok(vec![pumper, reply_loop, supervisor])
    }

    async fn reply_loop(
        self: Arc<Self>,
        mut lines: mpsc::UnboundedReceiver<String>,
        mut notices: broadcast::Receiver<SessionNotice>,
    ) {
        let parser = Parser::new();
        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&parser, &line),
                    None => break,
                },
                notice = notices.recv() => match notice {
                    Ok(SessionNotice::Disconnected { .. }) => {
                        self.awaiters.cancel_all();
                        self.push.cancel_all();
                        debug!("Teardown: awaiters rejected, push timers canceled");
                    }
                    Ok(SessionNotice::Connected { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "Reply loop lagged behind session notices");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Dispatches one framed line. Must never block on IO.
    fn handle_line(&self, parser: &Parser, line: &str) {
        for reply in parser.parse_line(line) {
            match reply {
                Reply::Switch {
                    addr,
                    value,
                    token,
                    raw,
                } => {
                    let source = match token {
                        SwitchToken::Rgs => SwitchSource::Rgs,
                        SwitchToken::Vgs => SwitchSource::Vgs,
                    };
                    self.switch_cache.insert(
                        addr,
                        SwitchRecord {
                            value,
                            raw: raw.clone(),
                            ts: Instant::now(),
                            bytes: line.len(),
                            source,
                        },
                    );
                    self.awaiters.resolve(AwaitKey::Switch(addr), &raw);
                    self.awaiters.remove_bare(&addr);
                }
                Reply::Load {
                    addr,
                    level,
                    fade,
                    token,
                    raw,
                } => {
                    self.load_cache.insert(
                        addr,
                        LoadRecord {
                            level,
                            fade,
                            raw: raw.clone(),
                            ts: Instant::now(),
                            bytes: line.len(),
                            source: token,
                        },
                    );
                    self.awaiters.resolve(AwaitKey::Load(addr), &raw);
                }
                Reply::Bare(value) => match self.awaiters.pop_bare() {
                    Some(addr) => {
                        let raw = value.to_string();
                        self.switch_cache.insert(
                            addr,
                            SwitchRecord {
                                value,
                                raw: raw.clone(),
                                ts: Instant::now(),
                                bytes: 1,
                                source: SwitchSource::Bare,
                            },
                        );
                        self.awaiters.resolve(AwaitKey::Switch(addr), &raw);
                    }
                    None => trace!(value, "Bare reply with empty FIFO, dropped"),
                },
                Reply::Push { addr, value } => self.push.on_event(addr, value),
            }
        }
    }

    // Operations.

    /// Connects to the configured server at `index`.
    pub async fn connect(&self, index: usize) -> BridgeResult<ConnectTarget> {
        let target = self
            .config
            .servers
            .get(index)
            .cloned()
            .ok_or_else(|| {
                BridgeError::InvalidInput(format!(
                    "server index {} out of range ({} configured)",
                    index,
                    self.config.servers.len()
                ))
            })?;
        self.session.connect(target.clone()).await?;
        Ok(target)
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub async fn switch_read(
        &self,
        addr: SwitchAddress,
        opts: ReadOptions,
    ) -> BridgeResult<SwitchReading> {
        self.dispatcher.switch_read(addr, opts).await
    }

    pub async fn switch_write(
        &self,
        addr: SwitchAddress,
        state: u8,
        wait_ms: u64,
    ) -> BridgeResult<SwitchWriteOutcome> {
        self.dispatcher.switch_write(addr, state, wait_ms).await
    }

    pub async fn load_set(
        &self,
        addr: LoadAddress,
        level: u8,
        fade: FadeSpec,
        max_ms: Option<u64>,
    ) -> BridgeResult<LoadSetOutcome> {
        self.dispatcher.load_set(addr, level, fade, max_ms).await
    }

    pub async fn load_read(
        &self,
        addr: LoadAddress,
        cache_ms: Option<u64>,
        max_ms: Option<u64>,
    ) -> BridgeResult<LoadReading> {
        self.dispatcher.load_read(addr, cache_ms, max_ms).await
    }

    pub async fn raw_send(
        &self,
        line: &str,
        opts: RawSendOptions,
    ) -> BridgeResult<RawSendOutcome> {
        self.dispatcher.raw_send(line, opts).await
    }

    // Peripherals.

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connected: self.session.is_connected(),
            target: self.session.connected_target().map(|t| t.name),
            servers: self.config.servers.len(),
            queue_depth: self.queue.depth(),
            switch_cache_entries: self.switch_cache.len(),
            load_cache_entries: self.load_cache.len(),
            push_state_entries: self.push_state.len(),
            whitelist_entries: self.whitelist.len(),
            pending_push_confirms: self.push.timer_count(),
        }
    }

    pub fn servers(&self) -> &[ConnectTarget] {
        &self.config.servers
    }

    pub fn recv_snapshot(&self) -> Vec<u8> {
        self.session.recv_snapshot()
    }

    pub fn recv_reset(&self) {
        self.session.recv_reset();
    }

    /// Reloads the whitelist from the configured file. Atomic swap.
    pub fn whitelist_reload(&self) -> BridgeResult<usize> {
        let path = self.config.whitelist_path.as_deref().ok_or_else(|| {
            BridgeError::InvalidInput("no whitelist file configured".to_string())
        })?;
        self.whitelist.load_from_path(path)
    }

    pub fn whitelist_snapshot(&self) -> Vec<SwitchAddress> {
        self.whitelist.snapshot()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn parts(
        &self,
    ) -> (
        &Arc<AwaiterRegistry>,
        &Arc<SwitchCache>,
        &Arc<LoadCache>,
        &Arc<PushStateMap>,
        &Arc<Whitelist>,
    ) {
        (
            &self.awaiters,
            &self.switch_cache,
            &self.load_cache,
            &self.push_state,
            &self.whitelist,
        )
    }
}
