//! Daemon lifecycle: wiring, signals, and the stop/status subcommands.

use crate::handlers;
use anyhow::Context;
use bridge_engine::{Bridge, BridgeConfig};
use bridge_ipc::{IpcClient, IpcServer, Method};
use std::sync::Arc;
use tracing::info;

/// Build the bridge, start its tasks, and serve IPC until shutdown.
pub async fn run_daemon(config: BridgeConfig, socket_path: &str) -> anyhow::Result<()> {
    info!(
        servers = config.servers.len(),
        min_gap_ms = config.min_gap_ms,
        "Starting qlink bridge"
    );

    let bridge = Bridge::new(config);
    let handles = bridge
        .start()
        .map_err(|e| anyhow::anyhow!("failed to start bridge: {e}"))?;

    let server = Arc::new(IpcServer::new(socket_path));
    handlers::register_handlers(&server, bridge.clone()).await;

    spawn_signal_listener(server.clone());

    server.run().await.context("IPC server failed")?;

    // Orderly teardown: drop the controller link, then the engine tasks.
    bridge.disconnect().await;
    for handle in handles {
        handle.abort();
    }
    info!("Bridge stopped");
    Ok(())
}

fn spawn_signal_listener(server: Arc<IpcServer>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(_) => {
                    let _ = ctrl_c.await;
                    info!("Interrupt received, shutting down");
                    server.shutdown();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("Interrupt received, shutting down"),
                _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            }
            server.shutdown();
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Interrupt received, shutting down");
            server.shutdown();
        }
    });
}

/// Ask a running daemon to shut down.
pub async fn stop_daemon(socket_path: &str) -> anyhow::Result<()> {
    let client = IpcClient::new(socket_path);
    if !client.is_daemon_running().await {
        println!("Daemon is not running");
        return Ok(());
    }
    client
        .call_method(Method::Shutdown)
        .await
        .context("shutdown request failed")?;
    println!("Daemon stopping");
    Ok(())
}

/// Print a running daemon's status.
pub async fn check_status(socket_path: &str) -> anyhow::Result<()> {
    let client = IpcClient::new(socket_path);
    match client.call_method(Method::BridgeStatus).await {
        Ok(response) => {
            if let Some(result) = response.result {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(error) = response.error {
                println!("Daemon error: {}", error.message);
            }
        }
        Err(_) => println!("Daemon is not running"),
    }
    Ok(())
}
