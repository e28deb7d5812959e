//! Raw send and receive-ring handlers.

use super::{bridge_error_response, parse_params};
use bridge_engine::{Bridge, RawSendOptions};
use bridge_ipc::{IpcServer, Method, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
struct RawSendParams {
    /// The command line; `data` and `message` are accepted as aliases.
    #[serde(alias = "data", alias = "message")]
    command: String,
    #[serde(default)]
    wait_ms: Option<u64>,
    #[serde(default)]
    quiet_ms: Option<u64>,
    #[serde(default)]
    max_ms: Option<u64>,
}

/// Register raw and receive-ring handlers.
pub async fn register(server: &IpcServer, bridge: Arc<Bridge>) {
    let b = bridge.clone();
    server
        .register_handler(Method::RawSend, move |req| {
            let bridge = b.clone();
            async move {
                let params: RawSendParams = match parse_params(&req) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                let opts = RawSendOptions {
                    wait_ms: params.wait_ms,
                    quiet_ms: params.quiet_ms,
                    max_ms: params.max_ms,
                };

                match bridge.raw_send(&params.command, opts).await {
                    Ok(outcome) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "command": outcome.command,
                            "response": outcome.collected,
                            "bytes": outcome.bytes,
                        }),
                    ),
                    Err(e) => bridge_error_response(&req.id, &e),
                }
            }
        })
        .await;

    let b = bridge.clone();
    server
        .register_handler(Method::RecvDump, move |req| {
            let bridge = b.clone();
            async move {
                let data = bridge.recv_snapshot();
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "bytes": data.len(),
                        "data": String::from_utf8_lossy(&data),
                    }),
                )
            }
        })
        .await;

    let b = bridge;
    server
        .register_handler(Method::RecvReset, move |req| {
            let bridge = b.clone();
            async move {
                bridge.recv_reset();
                Response::success(&req.id, serde_json::json!({ "ok": true }))
            }
        })
        .await;

    info!("Registered raw handlers");
}
