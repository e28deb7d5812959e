//! Startup auto-connect and reconnect-on-close.

use crate::session::{Session, SessionNotice};
use crate::target::ConnectTarget;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Connection policy runner.
///
/// Reconnects after any disconnect, manual ones included; callers that want
/// the link to stay down must disable auto-connect.
pub struct Supervisor {
    session: Arc<Session>,
    targets: Vec<ConnectTarget>,
    auto_connect: bool,
    auto_connect_index: usize,
    retry: Option<Duration>,
}

impl Supervisor {
    pub fn new(
        session: Arc<Session>,
        targets: Vec<ConnectTarget>,
        auto_connect: bool,
        auto_connect_index: usize,
        retry: Option<Duration>,
    ) -> Self {
        Self {
            session,
            targets,
            auto_connect,
            auto_connect_index,
            retry,
        }
    }

    /// Spawns the supervisor loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let mut notices = self.session.subscribe_notices();

        if self.auto_connect {
            if let Some(target) = self.targets.get(self.auto_connect_index) {
                if let Err(e) = self.session.connect(target.clone()).await {
                    warn!(target = %target, error = %e, "Auto-connect failed");
                    self.retry_until_connected().await;
                }
            } else {
                warn!(
                    index = self.auto_connect_index,
                    configured = self.targets.len(),
                    "Auto-connect index out of range"
                );
            }
        }

        loop {
            match notices.recv().await {
                Ok(SessionNotice::Disconnected { manual }) => {
                    if self.auto_connect && self.retry.is_some() {
                        info!(manual, "Session down, scheduling reconnect");
                        self.retry_until_connected().await;
                    }
                }
                Ok(SessionNotice::Connected { target }) => {
                    info!(target = %target, "Session up");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "Supervisor lagged behind session notices");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn retry_until_connected(&self) {
        let Some(delay) = self.retry else {
            return;
        };
        let Some(target) = self.targets.get(self.auto_connect_index).cloned() else {
            return;
        };

        loop {
            tokio::time::sleep(delay).await;
            // Someone may have reconnected manually in the meantime.
            if self.session.is_connected() {
                return;
            }
            match self.session.connect(target.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(target = %target, error = %e, "Reconnect attempt failed");
                }
            }
        }
    }
}
