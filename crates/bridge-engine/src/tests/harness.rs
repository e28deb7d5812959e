//! Test harness: a scripted TCP controller.
//!
//! `MockController` accepts the bridge's single connection, frames incoming
//! commands, records each with its arrival instant, and answers from its
//! internal switch/load state unless a scripted response is queued. Tests
//! can also emit unsolicited lines through the live connection.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use qlink_protocol::LineFramer;
use qlink_session::ConnectTarget;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A command line the controller received.
#[derive(Debug, Clone)]
pub struct ReceivedLine {
    pub line: String,
    pub at: Instant,
}

/// Scripted reply for the next received command.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum ScriptedResponse {
    /// Answer from the internal state maps (the default).
    AsState,
    /// Answer with a lone `0`/`1` byte and a newline.
    Bare(u8),
    /// Answer with this exact line.
    Line(String),
    /// Swallow the command.
    NoReply,
    /// Sleep, then answer from state.
    DelayMsThenState(u64),
    /// Drop the connection.
    Close,
}

/// Mock controller speaking the ASCII line protocol over TCP.
pub struct MockController {
    port: u16,
    received: Arc<Mutex<Vec<ReceivedLine>>>,
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    switch_states: Arc<Mutex<HashMap<(u16, u16, u16), u8>>>,
    load_levels: Arc<Mutex<HashMap<(u16, u8, u8, u8), u8>>>,
    writer: Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockController {
    /// Binds a listener and starts the accept loop.
    pub async fn start() -> (Arc<Self>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let controller = Arc::new(Self {
            port,
            received: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            switch_states: Arc::new(Mutex::new(HashMap::new())),
            load_levels: Arc::new(Mutex::new(HashMap::new())),
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            shutdown: Arc::new(AtomicBool::new(false)),
        });

        let this = controller.clone();
        let handle = tokio::spawn(async move {
            loop {
                if this.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let accepted = tokio::select! {
                    result = listener.accept() => result,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
                };
                if let Ok((stream, _)) = accepted {
                    this.clone().handle_connection(stream).await;
                }
            }
        });

        (controller, handle)
    }

    pub fn target(&self) -> ConnectTarget {
        ConnectTarget {
            name: "mock".to_string(),
            host: "127.0.0.1".to_string(),
            port: self.port,
        }
    }

    pub fn set_switch(&self, m: u16, s: u16, b: u16, value: u8) {
        self.switch_states.lock().unwrap().insert((m, s, b), value);
    }

    pub fn set_load(&self, m: u16, e: u8, module: u8, l: u8, level: u8) {
        self.load_levels
            .lock()
            .unwrap()
            .insert((m, e, module, l), level);
    }

    pub fn queue_response(&self, response: ScriptedResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn received_lines(&self) -> Vec<ReceivedLine> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn clear_received(&self) {
        self.received.lock().unwrap().clear();
    }

    /// Waits until at least `count` commands arrived, or panics at timeout.
    pub async fn wait_for_received(&self, count: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.received_count() < count {
            if Instant::now() > deadline {
                panic!(
                    "timed out waiting for {} received lines, have {}",
                    count,
                    self.received_count()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Emits an unsolicited line (for example an `SW` event) to the bridge.
    pub async fn send_unsolicited(&self, line: &str) {
        let mut writer = self.writer.lock().await;
        if let Some(w) = writer.as_mut() {
            w.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
        } else {
            panic!("no live connection to emit on");
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let (mut read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let this = self.clone();
        tokio::spawn(async move {
            let mut framer = LineFramer::new();
            let mut buf = vec![0u8; 1024];
            loop {
                if this.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let n = match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for line in framer.push(&buf[..n]) {
                    this.received.lock().unwrap().push(ReceivedLine {
                        line: line.clone(),
                        at: Instant::now(),
                    });

                    let response = this
                        .responses
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or(ScriptedResponse::AsState);
                    if !this.respond(&line, response).await {
                        return;
                    }
                }
            }
        });
    }

    /// Returns false when the connection should drop.
    async fn respond(&self, line: &str, response: ScriptedResponse) -> bool {
        match response {
            ScriptedResponse::AsState => {
                if let Some(reply) = self.state_reply(line) {
                    self.write_line(&reply).await;
                }
                true
            }
            ScriptedResponse::Bare(v) => {
                self.write_raw(format!("{}\n", v).as_bytes()).await;
                true
            }
            ScriptedResponse::Line(l) => {
                self.write_line(&l).await;
                true
            }
            ScriptedResponse::NoReply => true,
            ScriptedResponse::DelayMsThenState(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                if let Some(reply) = self.state_reply(line) {
                    self.write_line(&reply).await;
                }
                true
            }
            ScriptedResponse::Close => {
                *self.writer.lock().await = None;
                false
            }
        }
    }

    fn state_reply(&self, line: &str) -> Option<String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.first().copied() {
            Some("VGS#") | Some("VGS") if parts.len() == 4 => {
                let m = parts[1].parse().ok()?;
                let s = parts[2].parse().ok()?;
                let b = parts[3].parse().ok()?;
                let v = *self.switch_states.lock().unwrap().get(&(m, s, b)).unwrap_or(&0);
                Some(format!("RGS# {} {} {} {}", m, s, b, v))
            }
            Some("VSW") if parts.len() == 5 => {
                let m = parts[1].parse().ok()?;
                let s = parts[2].parse().ok()?;
                let b = parts[3].parse().ok()?;
                let v = parts[4].parse().ok()?;
                self.switch_states.lock().unwrap().insert((m, s, b), v);
                None
            }
            Some("VLB#") | Some("VLB") if parts.len() >= 6 => {
                let m = parts[1].parse().ok()?;
                let e = parts[2].parse().ok()?;
                let module = parts[3].parse().ok()?;
                let l = parts[4].parse().ok()?;
                let level = parts[5].parse().ok()?;
                self.load_levels
                    .lock()
                    .unwrap()
                    .insert((m, e, module, l), level);
                let mut reply = format!("RLB# {} {} {} {} {}", m, e, module, l, level);
                if let Some(fade) = parts.get(6) {
                    reply.push(' ');
                    reply.push_str(fade);
                }
                Some(reply)
            }
            Some("VGB#") | Some("VGB") if parts.len() == 5 => {
                let m = parts[1].parse().ok()?;
                let e = parts[2].parse().ok()?;
                let module = parts[3].parse().ok()?;
                let l = parts[4].parse().ok()?;
                let level = *self
                    .load_levels
                    .lock()
                    .unwrap()
                    .get(&(m, e, module, l))
                    .unwrap_or(&0);
                Some(format!("RGB# {} {} {} {} {}", m, e, module, l, level))
            }
            _ => None,
        }
    }

    async fn write_line(&self, line: &str) {
        self.write_raw(format!("{}\r\n", line).as_bytes()).await;
    }

    async fn write_raw(&self, bytes: &[u8]) {
        let mut writer = self.writer.lock().await;
        if let Some(w) = writer.as_mut() {
            let _ = w.write_all(bytes).await;
        }
    }
}

/// A bridge wired to a mock controller, connected and running.
pub struct TestBridge {
    pub bridge: Arc<Bridge>,
    pub controller: Arc<MockController>,
    handles: Vec<JoinHandle<()>>,
    controller_handle: JoinHandle<()>,
}

impl TestBridge {
    /// Starts a controller and a bridge with test-friendly timings.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Same, with a config hook.
    pub async fn start_with(tweak: impl FnOnce(&mut BridgeConfig)) -> Self {
        let (controller, controller_handle) = MockController::start().await;

        let mut config = BridgeConfig {
            servers: vec![controller.target()],
            handshake: String::new(),
            min_gap_ms: 30,
            auto_connect: true,
            auto_connect_index: 0,
            auto_connect_retry_ms: 100,
            ..BridgeConfig::default()
        };
        tweak(&mut config);
        let auto_connect = config.auto_connect;

        let bridge = Bridge::new(config);
        let handles = bridge.start().unwrap();

        // Wait for the supervisor's auto-connect when it is on.
        if auto_connect {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !bridge.status().connected {
                assert!(Instant::now() < deadline, "bridge never connected");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        Self {
            bridge,
            controller,
            handles,
            controller_handle,
        }
    }

    pub fn stop(self) {
        self.controller.shutdown();
        self.controller_handle.abort();
        for handle in self.handles {
            handle.abort();
        }
    }
}
