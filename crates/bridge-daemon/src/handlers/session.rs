//! Session control and bridge status handlers.

use super::{bridge_error_response, parse_params};
use bridge_engine::Bridge;
use bridge_ipc::{IpcServer, Method, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
struct ConnectParams {
    server_index: usize,
}

/// Register session and status handlers.
pub async fn register(server: &IpcServer, bridge: Arc<Bridge>) {
    let b = bridge.clone();
    server
        .register_handler(Method::BridgeStatus, move |req| {
            let bridge = b.clone();
            async move {
                match serde_json::to_value(bridge.status()) {
                    Ok(status) => Response::success(&req.id, status),
                    Err(e) => Response::error(
                        &req.id,
                        bridge_ipc::error_codes::INTERNAL_ERROR,
                        &e.to_string(),
                    ),
                }
            }
        })
        .await;

    let b = bridge.clone();
    server
        .register_handler(Method::BridgeServers, move |req| {
            let bridge = b.clone();
            async move {
                let connected = bridge.status().target;
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "servers": bridge.servers(),
                        "connected": connected,
                    }),
                )
            }
        })
        .await;

    let b = bridge.clone();
    server
        .register_handler(Method::SessionConnect, move |req| {
            let bridge = b.clone();
            async move {
                let params: ConnectParams = match parse_params(&req) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                match bridge.connect(params.server_index).await {
                    Ok(target) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "ok": true,
                            "message": format!("Connected to {}", target),
                        }),
                    ),
                    Err(e) => bridge_error_response(&req.id, &e),
                }
            }
        })
        .await;

    let b = bridge;
    server
        .register_handler(Method::SessionDisconnect, move |req| {
            let bridge = b.clone();
            async move {
                bridge.disconnect().await;
                Response::success(
                    &req.id,
                    serde_json::json!({ "ok": true, "message": "Disconnected" }),
                )
            }
        })
        .await;

    info!("Registered session handlers");
}
