//! High-level operations: switch read/write, load set/read, raw send.
//!
//! Each operation composes the send queue and the awaiter registry: the
//! write goes through the queue so pacing holds, the awaiter is registered
//! before the write is issued, and the queue slot frees as soon as the write
//! returns while the awaiter keeps waiting outside it.
//!
//! Reads coalesce: the first cold-cache request for an address becomes the
//! leader and performs the wire round trip; every concurrent request for the
//! same address rides the leader's outcome.

use crate::awaiter::{AwaitKey, AwaiterRegistry};
use crate::cache::{LoadCache, PushStateMap, SwitchCache, SwitchSource};
use crate::config::{BridgeConfig, AWAIT_DEFAULT_MS, CONFIRM_MAX_MS};
use crate::error::{BridgeError, BridgeResult};
use crate::queue::{SendQueue, PRIORITY_RAW, PRIORITY_READ, PRIORITY_WRITE};
use qlink_protocol::{Command, LoadAddress, LoadToken, SwitchAddress};
use qlink_session::Session;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

/// How a read was satisfied, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Served from fresh cached or push-confirmed state.
    Hit,
    /// Rode a concurrent in-flight request for the same address.
    Stream,
    /// Went to the wire.
    Miss,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Hit => "cache-hit",
            CacheState::Stream => "stream",
            CacheState::Miss => "miss",
        }
    }
}

/// Options accepted by [`Dispatcher::switch_read`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Freshness window; defaults to the configured polling floor.
    pub cache_ms: Option<u64>,
    /// Awaiter deadline; floored at 50 ms, defaults to 2000 ms.
    pub max_ms: Option<u64>,
    /// Pre-request sleep drawn uniformly from `[0, jitter_ms)`.
    pub jitter_ms: Option<u64>,
    /// Accepted for request compatibility; unused by this path.
    pub quiet_ms: Option<u64>,
}

/// Result of a switch read.
#[derive(Debug, Clone)]
pub struct SwitchReading {
    pub addr: SwitchAddress,
    pub value: u8,
    pub raw: String,
    pub ts: Instant,
    pub age_ms: u64,
    pub source: SwitchSource,
    pub cache_state: CacheState,
    pub stale_fallback: bool,
    pub command: Option<String>,
}

impl SwitchReading {
    /// Response headers for the external HTTP router.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-VGS-Source", self.source.as_str().to_string()),
            ("X-VGS-Cache", self.cache_state.as_str().to_string()),
            ("X-VGS-Age", self.age_ms.to_string()),
        ];
        if let Some(cmd) = &self.command {
            headers.push(("X-VGS-Note", format!("sent {}", cmd)));
        }
        if self.stale_fallback {
            headers.push(("X-Status-Fallback", "stale-cache".to_string()));
        }
        headers
    }
}

/// Result of a switch write.
#[derive(Debug, Clone)]
pub struct SwitchWriteOutcome {
    pub command: String,
    pub collected: String,
    pub bytes: usize,
}

/// Fade handling for a load write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeSpec {
    /// Caller said nothing; use the configured default.
    Default,
    /// Caller explicitly asked for no fade on the wire.
    Omit,
    /// Caller gave a fade in seconds.
    Seconds(f32),
}

/// Result of a load set.
#[derive(Debug, Clone)]
pub struct LoadSetOutcome {
    pub addr: LoadAddress,
    pub level: u8,
    pub fade: Option<f32>,
    pub raw: String,
    pub source: LoadToken,
    pub command: String,
}

impl LoadSetOutcome {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-Load-Command", self.command.clone()),
            ("X-Load-Source", self.source.as_str().to_string()),
            ("X-Load-Level", self.level.to_string()),
        ];
        if let Some(fade) = self.fade {
            headers.push(("X-Load-Fade", fade.to_string()));
        }
        headers
    }
}

/// Result of a load read.
#[derive(Debug, Clone)]
pub struct LoadReading {
    pub addr: LoadAddress,
    pub level: u8,
    pub fade: Option<f32>,
    pub raw: String,
    pub ts: Instant,
    pub age_ms: u64,
    pub source: LoadToken,
    pub cache_state: CacheState,
    pub stale_fallback: bool,
    pub command: Option<String>,
}

impl LoadReading {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-Load-Cache", self.cache_state.as_str().to_string()),
            ("X-Load-Source", self.source.as_str().to_string()),
            ("X-Load-Level", self.level.to_string()),
        ];
        if let Some(cmd) = &self.command {
            headers.push(("X-Load-Command", cmd.clone()));
        }
        if let Some(fade) = self.fade {
            headers.push(("X-Load-Fade", fade.to_string()));
        }
        if self.stale_fallback {
            headers.push(("X-Status-Fallback", "stale-cache".to_string()));
        }
        headers
    }
}

/// Options for a raw send.
#[derive(Debug, Clone, Default)]
pub struct RawSendOptions {
    /// Collect replies for this fixed window.
    pub wait_ms: Option<u64>,
    /// Collect replies until this much silence.
    pub quiet_ms: Option<u64>,
    /// Hard cap on quiet-window collection.
    pub max_ms: Option<u64>,
}

/// Result of a raw send.
#[derive(Debug, Clone)]
pub struct RawSendOutcome {
    pub command: String,
    pub collected: String,
    pub bytes: usize,
}

/// Operation dispatcher over the shared engine state.
pub struct Dispatcher {
    config: BridgeConfig,
    session: Arc<Session>,
    queue: Arc<SendQueue>,
    awaiters: Arc<AwaiterRegistry>,
    switch_cache: Arc<SwitchCache>,
    load_cache: Arc<LoadCache>,
    push_state: Arc<PushStateMap>,
    inflight_switch: Mutex<HashMap<SwitchAddress, broadcast::Sender<Option<SwitchReading>>>>,
    inflight_load: Mutex<HashMap<LoadAddress, broadcast::Sender<Option<LoadReading>>>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BridgeConfig,
        session: Arc<Session>,
        queue: Arc<SendQueue>,
        awaiters: Arc<AwaiterRegistry>,
        switch_cache: Arc<SwitchCache>,
        load_cache: Arc<LoadCache>,
        push_state: Arc<PushStateMap>,
    ) -> Self {
        Self {
            config,
            session,
            queue,
            awaiters,
            switch_cache,
            load_cache,
            push_state,
            inflight_switch: Mutex::new(HashMap::new()),
            inflight_load: Mutex::new(HashMap::new()),
        }
    }

    /// Reads a switch, preferring push state, then cache, then a coalesced
    /// or live wire read.
    pub async fn switch_read(
        self: &Arc<Self>,
        addr: SwitchAddress,
        opts: ReadOptions,
    ) -> BridgeResult<SwitchReading> {
        self.switch_read_inner(addr, opts, false).await
    }

    /// The confirm read the push pipeline issues: always goes past the
    /// freshness gates, since its whole point is a fresh authoritative value.
    pub async fn confirm_read(self: &Arc<Self>, addr: SwitchAddress) -> BridgeResult<SwitchReading> {
        let opts = ReadOptions {
            max_ms: Some(CONFIRM_MAX_MS),
            ..ReadOptions::default()
        };
        self.switch_read_inner(addr, opts, true).await
    }

    async fn switch_read_inner(
        self: &Arc<Self>,
        addr: SwitchAddress,
        opts: ReadOptions,
        skip_freshness: bool,
    ) -> BridgeResult<SwitchReading> {
        if !skip_freshness {
            if let Some(ps) = self.push_state.get(&addr) {
                let age = ps.ts.elapsed();
                if age < self.config.push_fresh() {
                    return Ok(SwitchReading {
                        addr,
                        value: ps.value,
                        raw: ps.value.to_string(),
                        ts: ps.ts,
                        age_ms: age.as_millis() as u64,
                        source: SwitchSource::PushState,
                        cache_state: CacheState::Hit,
                        stale_fallback: false,
                        command: None,
                    });
                }
            }

            let window =
                Duration::from_millis(opts.cache_ms.unwrap_or(self.config.min_poll_interval_ms));
            if let Some(rec) = self.switch_cache.get(&addr) {
                let age = rec.ts.elapsed();
                if age < window {
                    return Ok(SwitchReading {
                        addr,
                        value: rec.value,
                        raw: rec.raw,
                        ts: rec.ts,
                        age_ms: age.as_millis() as u64,
                        source: SwitchSource::Cache,
                        cache_state: CacheState::Hit,
                        stale_fallback: false,
                        command: None,
                    });
                }
            }
        }

        // In-flight coalescing: first caller leads, the rest subscribe.
        let follower = {
            let mut inflight = self.inflight_switch.lock().unwrap();
            match inflight.get(&addr) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    inflight.insert(addr, tx);
                    None
                }
            }
        };

        if let Some(mut rx) = follower {
            return match rx.recv().await {
                Ok(Some(mut reading)) => {
                    reading.cache_state = CacheState::Stream;
                    Ok(reading)
                }
                Ok(None) | Err(_) => self.stale_switch_or(
                    addr,
                    BridgeError::Timeout {
                        ms: opts.max_ms.unwrap_or(AWAIT_DEFAULT_MS),
                    },
                ),
            };
        }

        let result = self.live_switch_read(addr, &opts).await;

        let tx = self.inflight_switch.lock().unwrap().remove(&addr);
        if let Some(tx) = tx {
            let _ = tx.send(result.as_ref().ok().cloned());
        }

        match result {
            Ok(reading) => Ok(reading),
            Err(e) => self.stale_switch_or(addr, e),
        }
    }

    async fn live_switch_read(
        &self,
        addr: SwitchAddress,
        opts: &ReadOptions,
    ) -> BridgeResult<SwitchReading> {
        if !self.session.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let jitter = opts.jitter_ms.unwrap_or(0);
        if jitter > 0 {
            let ms = rand::thread_rng().gen_range(0..jitter);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let command = Command::SwitchRead(addr);
        let line = command.render()?;
        let bytes = command.encode(self.config.line_ending)?;

        // Register before writing so the reply cannot race registration,
        // and mark the request bare-eligible before the controller can
        // possibly answer.
        let pending = self.awaiters.register(AwaitKey::Switch(addr))?;
        self.awaiters.push_bare(addr);

        let label = format!("vgs {}", addr.key());
        if let Err(e) = self.queue.submit(bytes, PRIORITY_READ, &label).await {
            self.awaiters.abandon(pending);
            self.awaiters.remove_bare(&addr);
            return Err(e);
        }

        let max = Duration::from_millis(opts.max_ms.unwrap_or(AWAIT_DEFAULT_MS));
        match self.awaiters.wait(pending, max).await {
            Ok(raw) => {
                // The reply loop cached the record before resolving.
                let rec = self.switch_cache.get(&addr).ok_or_else(|| {
                    BridgeError::Internal("resolved switch reply missing from cache".to_string())
                })?;
                Ok(SwitchReading {
                    addr,
                    value: rec.value,
                    raw,
                    ts: rec.ts,
                    age_ms: 0,
                    source: SwitchSource::TcpAwait,
                    cache_state: CacheState::Miss,
                    stale_fallback: false,
                    command: Some(line),
                })
            }
            Err(e) => {
                // No longer an outstanding bare-eligible request.
                self.awaiters.remove_bare(&addr);
                Err(e)
            }
        }
    }

    fn stale_switch_or(
        &self,
        addr: SwitchAddress,
        err: BridgeError,
    ) -> BridgeResult<SwitchReading> {
        if !err.allows_stale_fallback() {
            return Err(err);
        }
        if let Some(rec) = self.switch_cache.get(&addr) {
            debug!(addr = %addr, error = %err, "Serving stale switch record");
            return Ok(SwitchReading {
                addr,
                value: rec.value,
                raw: rec.raw,
                ts: rec.ts,
                age_ms: rec.ts.elapsed().as_millis() as u64,
                source: SwitchSource::Cache,
                cache_state: CacheState::Hit,
                stale_fallback: true,
                command: None,
            });
        }
        if let Some(ps) = self.push_state.get(&addr) {
            debug!(addr = %addr, error = %err, "Serving stale push state");
            return Ok(SwitchReading {
                addr,
                value: ps.value,
                raw: ps.value.to_string(),
                ts: ps.ts,
                age_ms: ps.ts.elapsed().as_millis() as u64,
                source: SwitchSource::PushState,
                cache_state: CacheState::Hit,
                stale_fallback: true,
                command: None,
            });
        }
        Err(err)
    }

    /// Writes a switch state, optionally collecting reply bytes for a fixed
    /// window afterwards.
    pub async fn switch_write(
        &self,
        addr: SwitchAddress,
        state: u8,
        wait_ms: u64,
    ) -> BridgeResult<SwitchWriteOutcome> {
        let command = Command::SwitchWrite(addr, state);
        let line = command.render()?;
        let bytes = command.encode(self.config.line_ending)?;

        // Subscribe before the write so nothing between write and collect is
        // missed.
        let tap = (wait_ms > 0).then(|| self.session.subscribe_chunks());

        let label = format!("vsw {}", addr.key());
        self.queue.submit(bytes, PRIORITY_WRITE, &label).await?;

        let collected = match tap {
            Some(rx) => collect_fixed_window(rx, Duration::from_millis(wait_ms)).await,
            None => Vec::new(),
        };
        Ok(SwitchWriteOutcome {
            command: line,
            bytes: collected.len(),
            collected: String::from_utf8_lossy(&collected).into_owned(),
        })
    }

    /// Sets a load level, awaiting the `RLB`/`RGB` confirmation.
    pub async fn load_set(
        &self,
        addr: LoadAddress,
        level: u8,
        fade: FadeSpec,
        max_ms: Option<u64>,
    ) -> BridgeResult<LoadSetOutcome> {
        let fade = match fade {
            FadeSpec::Default => Some(self.config.default_load_fade_seconds),
            FadeSpec::Omit => None,
            FadeSpec::Seconds(s) => Some(s),
        };
        let command = Command::LoadSet { addr, level, fade };
        let line = command.render()?;
        let bytes = command.encode(self.config.line_ending)?;

        let pending = self.awaiters.register(AwaitKey::Load(addr))?;
        let label = format!("vlb {}", addr.key());
        if let Err(e) = self.queue.submit(bytes, PRIORITY_WRITE, &label).await {
            self.awaiters.abandon(pending);
            return Err(e);
        }

        let max = Duration::from_millis(max_ms.unwrap_or(AWAIT_DEFAULT_MS));
        let raw = self.awaiters.wait(pending, max).await?;
        let rec = self.load_cache.get(&addr).ok_or_else(|| {
            BridgeError::Internal("resolved load reply missing from cache".to_string())
        })?;
        Ok(LoadSetOutcome {
            addr,
            level: rec.level,
            fade: rec.fade,
            raw,
            source: rec.source,
            command: line,
        })
    }

    /// Reads a load level: cache gate, coalesce, then `VGB#`.
    pub async fn load_read(
        self: &Arc<Self>,
        addr: LoadAddress,
        cache_ms: Option<u64>,
        max_ms: Option<u64>,
    ) -> BridgeResult<LoadReading> {
        let window = Duration::from_millis(cache_ms.unwrap_or(self.config.min_poll_interval_ms));
        if let Some(rec) = self.load_cache.get(&addr) {
            let age = rec.ts.elapsed();
            if age < window {
                return Ok(LoadReading {
                    addr,
                    level: rec.level,
                    fade: rec.fade,
                    raw: rec.raw,
                    ts: rec.ts,
                    age_ms: age.as_millis() as u64,
                    source: rec.source,
                    cache_state: CacheState::Hit,
                    stale_fallback: false,
                    command: None,
                });
            }
        }

        let follower = {
            let mut inflight = self.inflight_load.lock().unwrap();
            match inflight.get(&addr) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    inflight.insert(addr, tx);
                    None
                }
            }
        };

        if let Some(mut rx) = follower {
            return match rx.recv().await {
                Ok(Some(mut reading)) => {
                    reading.cache_state = CacheState::Stream;
                    Ok(reading)
                }
                Ok(None) | Err(_) => self.stale_load_or(
                    addr,
                    BridgeError::Timeout {
                        ms: max_ms.unwrap_or(AWAIT_DEFAULT_MS),
                    },
                ),
            };
        }

        let result = self.live_load_read(addr, max_ms).await;

        let tx = self.inflight_load.lock().unwrap().remove(&addr);
        if let Some(tx) = tx {
            let _ = tx.send(result.as_ref().ok().cloned());
        }

        match result {
            Ok(reading) => Ok(reading),
            Err(e) => self.stale_load_or(addr, e),
        }
    }

    async fn live_load_read(
        &self,
        addr: LoadAddress,
        max_ms: Option<u64>,
    ) -> BridgeResult<LoadReading> {
        if !self.session.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let command = Command::LoadRead(addr);
        let line = command.render()?;
        let bytes = command.encode(self.config.line_ending)?;

        let pending = self.awaiters.register(AwaitKey::Load(addr))?;
        let label = format!("vgb {}", addr.key());
        if let Err(e) = self.queue.submit(bytes, PRIORITY_READ, &label).await {
            self.awaiters.abandon(pending);
            return Err(e);
        }

        let max = Duration::from_millis(max_ms.unwrap_or(AWAIT_DEFAULT_MS));
        let raw = self.awaiters.wait(pending, max).await?;
        let rec = self.load_cache.get(&addr).ok_or_else(|| {
            BridgeError::Internal("resolved load reply missing from cache".to_string())
        })?;
        Ok(LoadReading {
            addr,
            level: rec.level,
            fade: rec.fade,
            raw,
            ts: rec.ts,
            age_ms: 0,
            source: rec.source,
            cache_state: CacheState::Miss,
            stale_fallback: false,
            command: Some(line),
        })
    }

    fn stale_load_or(&self, addr: LoadAddress, err: BridgeError) -> BridgeResult<LoadReading> {
        if !err.allows_stale_fallback() {
            return Err(err);
        }
        if let Some(rec) = self.load_cache.get(&addr) {
            debug!(addr = %addr, error = %err, "Serving stale load record");
            return Ok(LoadReading {
                addr,
                level: rec.level,
                fade: rec.fade,
                raw: rec.raw,
                ts: rec.ts,
                age_ms: rec.ts.elapsed().as_millis() as u64,
                source: rec.source,
                cache_state: CacheState::Hit,
                stale_fallback: true,
                command: None,
            });
        }
        Err(err)
    }

    /// Passes an arbitrary line to the controller, optionally collecting
    /// whatever comes back.
    pub async fn raw_send(
        &self,
        line: &str,
        opts: RawSendOptions,
    ) -> BridgeResult<RawSendOutcome> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::InvalidInput("empty command".to_string()));
        }

        let command = Command::Raw(trimmed.to_string());
        let bytes = command.encode(self.config.line_ending)?;

        let quiet = opts.quiet_ms.unwrap_or(0);
        let wait = opts.wait_ms.unwrap_or(0);
        let tap = (quiet > 0 || wait > 0).then(|| self.session.subscribe_chunks());

        self.queue.submit(bytes, PRIORITY_RAW, "raw send").await?;

        let collected = match tap {
            Some(rx) => {
                if quiet > 0 {
                    let max = Duration::from_millis(opts.max_ms.unwrap_or(AWAIT_DEFAULT_MS));
                    collect_until_quiet(rx, Duration::from_millis(quiet), max).await
                } else {
                    collect_fixed_window(rx, Duration::from_millis(wait)).await
                }
            }
            None => Vec::new(),
        };
        Ok(RawSendOutcome {
            command: trimmed.to_string(),
            bytes: collected.len(),
            collected: String::from_utf8_lossy(&collected).into_owned(),
        })
    }

    /// In-flight switch reads, for status output.
    pub fn inflight_switch_count(&self) -> usize {
        self.inflight_switch.lock().unwrap().len()
    }
}

/// Collects tap bytes for a fixed window.
async fn collect_fixed_window(
    mut rx: broadcast::Receiver<Vec<u8>>,
    window: Duration,
) -> Vec<u8> {
    let mut out = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }
    out
}

/// Collects tap bytes until `quiet` of silence or the hard cap.
async fn collect_until_quiet(
    mut rx: broadcast::Receiver<Vec<u8>>,
    quiet: Duration,
    max: Duration,
) -> Vec<u8> {
    let mut out = Vec::new();
    let hard_deadline = tokio::time::Instant::now() + max;
    let mut quiet_deadline = tokio::time::Instant::now() + quiet;
    loop {
        let next = quiet_deadline.min(hard_deadline);
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Ok(bytes) => {
                    out.extend_from_slice(&bytes);
                    quiet_deadline = tokio::time::Instant::now() + quiet;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::time::sleep_until(next) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_fixed_window_gathers_until_deadline() {
        let (tx, rx) = broadcast::channel(16);
        let producer = tokio::spawn(async move {
            tx.send(b"abc".to_vec()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(b"def".to_vec()).unwrap();
            // Past the window; must not be collected.
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(b"late".to_vec());
        });

        let out = collect_fixed_window(rx, Duration::from_millis(100)).await;
        assert_eq!(out, b"abcdef");
        producer.abort();
    }

    #[tokio::test]
    async fn test_collect_until_quiet_stops_on_silence() {
        let (tx, rx) = broadcast::channel(16);
        let producer = tokio::spawn(async move {
            for _ in 0..3 {
                tx.send(b"x".to_vec()).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            // Then silence.
        });

        let start = Instant::now();
        let out = collect_until_quiet(
            rx,
            Duration::from_millis(60),
            Duration::from_millis(2_000),
        )
        .await;
        assert_eq!(out, b"xxx");
        // Stopped on quiet, far before the hard cap.
        assert!(start.elapsed() < Duration::from_millis(1_000));
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_collect_until_quiet_hard_cap() {
        let (tx, rx) = broadcast::channel(64);
        let producer = tokio::spawn(async move {
            // Keeps talking forever with gaps below the quiet window.
            loop {
                if tx.send(b"y".to_vec()).is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let start = Instant::now();
        let out = collect_until_quiet(
            rx,
            Duration::from_millis(100),
            Duration::from_millis(150),
        )
        .await;
        assert!(!out.is_empty());
        assert!(start.elapsed() < Duration::from_millis(400));
        producer.abort();
    }
}
