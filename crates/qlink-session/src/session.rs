//! The single controller connection.

use crate::error::{SessionError, SessionResult};
use crate::target::ConnectTarget;
use qlink_protocol::LineFramer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Deadline for TCP connect establishment.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session configuration, extracted from the bridge config at wiring time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Opaque handshake written once after connect; empty disables it.
    pub handshake: String,
    /// One further handshake write after this delay, if set.
    pub handshake_retry: Option<Duration>,
    /// Cap on the debug receive ring.
    pub recv_ring_max: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake: qlink_protocol::DEFAULT_HANDSHAKE.to_string(),
            handshake_retry: None,
            recv_ring_max: 32 * 1024,
        }
    }
}

/// Connection lifecycle notice, published to the engine and supervisor.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    Connected { target: ConnectTarget },
    Disconnected { manual: bool },
}

/// The single TCP session to the controller.
///
/// Only the send-queue pumper calls [`Session::write`]; the handshake is the
/// one exception and happens before the pumper knows the link is up.
pub struct Session {
    config: SessionConfig,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    target: Mutex<Option<ConnectTarget>>,
    epoch: AtomicU64,
    ring: Mutex<Vec<u8>>,
    chunk_tap: broadcast::Sender<Vec<u8>>,
    notices: broadcast::Sender<SessionNotice>,
    lines: mpsc::UnboundedSender<String>,
}

impl Session {
    /// Creates the session and the line channel the engine consumes.
    pub fn new(config: SessionConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        let (chunk_tap, _) = broadcast::channel(256);
        let (notices, _) = broadcast::channel(16);
        let session = Arc::new(Self {
            config,
            writer: tokio::sync::Mutex::new(None),
            target: Mutex::new(None),
            epoch: AtomicU64::new(0),
            ring: Mutex::new(Vec::new()),
            chunk_tap,
            notices,
            lines: lines_tx,
        });
        (session, lines_rx)
    }

    /// Connects to the target, replacing any existing connection.
    pub async fn connect(self: &Arc<Self>, target: ConnectTarget) -> SessionResult<()> {
        if self.is_connected() {
            self.teardown(true).await;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(target = %target, "Connecting to controller");

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(target.addr()))
            .await
            .map_err(|_| {
                SessionError::ConnectTimeout(target.addr(), CONNECT_TIMEOUT.as_millis() as u64)
            })??;

        stream.set_nodelay(true)?;
        socket2::SockRef::from(&stream).set_keepalive(true)?;

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.target.lock().unwrap() = Some(target.clone());

        let reader = self.clone();
        tokio::spawn(async move {
            reader.read_loop(read_half, epoch).await;
        });

        if !self.config.handshake.is_empty() {
            self.write(self.config.handshake.as_bytes()).await?;
            debug!("Handshake sent");

            if let Some(retry) = self.config.handshake_retry {
                let session = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(retry).await;
                    // Only if this is still the same connection.
                    if session.epoch.load(Ordering::SeqCst) == epoch {
                        let handshake = session.config.handshake.clone();
                        if let Err(e) = session.write(handshake.as_bytes()).await {
                            warn!(error = %e, "Handshake retry failed");
                        } else {
                            debug!("Handshake retried");
                        }
                    }
                });
            }
        }

        let _ = self.notices.send(SessionNotice::Connected { target });
        Ok(())
    }

    /// Writes bytes to the controller. The sole write primitive.
    pub async fn write(&self, bytes: &[u8]) -> SessionResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::NotConnected)?;

        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Write failed, tearing down session");
            drop(guard);
            self.teardown(false).await;
            return Err(SessionError::Io(e));
        }
        Ok(())
    }

    /// Manual disconnect. A no-op when already down.
    pub async fn disconnect(&self) {
        if self.is_connected() {
            info!("Disconnecting from controller");
            self.teardown(true).await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.target.lock().unwrap().is_some()
    }

    /// The currently connected target, if any.
    pub fn connected_target(&self) -> Option<ConnectTarget> {
        self.target.lock().unwrap().clone()
    }

    /// Snapshot of the bounded receive ring.
    pub fn recv_snapshot(&self) -> Vec<u8> {
        self.ring.lock().unwrap().clone()
    }

    pub fn recv_reset(&self) {
        self.ring.lock().unwrap().clear();
    }

    /// Raw inbound chunks, for fixed-window and quiet-window collection.
    pub fn subscribe_chunks(&self) -> broadcast::Receiver<Vec<u8>> {
        self.chunk_tap.subscribe()
    }

    /// Connection lifecycle notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    async fn read_loop(self: Arc<Self>, mut read_half: OwnedReadHalf, epoch: u64) {
        let mut framer = LineFramer::new();
        let mut buf = vec![0u8; 4096];

        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    debug!("Controller closed the connection");
                    break;
                }
                Ok(n) => {
                    if self.epoch.load(Ordering::SeqCst) != epoch {
                        return;
                    }
                    let chunk = &buf[..n];
                    self.append_ring(chunk);
                    let _ = self.chunk_tap.send(chunk.to_vec());
                    for line in framer.push(chunk) {
                        if self.lines.send(line).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Read error");
                    break;
                }
            }
        }

        // Only tear down if nothing replaced this connection already.
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.teardown(false).await;
        }
    }

    /// Pre-trim to cap, then append.
    fn append_ring(&self, chunk: &[u8]) {
        let mut ring = self.ring.lock().unwrap();
        let cap = self.config.recv_ring_max;
        if ring.len() + chunk.len() > cap {
            let excess = (ring.len() + chunk.len()).saturating_sub(cap);
            let drop_n = excess.min(ring.len());
            ring.drain(..drop_n);
        }
        let take = chunk.len().min(cap);
        ring.extend_from_slice(&chunk[chunk.len() - take..]);
    }

    async fn teardown(&self, manual: bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.writer.lock().await = None;
        *self.target.lock().unwrap() = None;
        self.ring.lock().unwrap().clear();
        let _ = self.notices.send(SessionNotice::Disconnected { manual });
    }
}
