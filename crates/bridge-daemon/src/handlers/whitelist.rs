//! Whitelist handlers.

use super::bridge_error_response;
use bridge_engine::Bridge;
use bridge_ipc::{IpcServer, Method, Response};
use std::sync::Arc;
use tracing::info;

/// Register whitelist handlers.
pub async fn register(server: &IpcServer, bridge: Arc<Bridge>) {
    let b = bridge.clone();
    server
        .register_handler(Method::WhitelistShow, move |req| {
            let bridge = b.clone();
            async move {
                let entries = bridge.whitelist_snapshot();
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "count": entries.len(),
                        "strict": bridge.config().whitelist_strict,
                        "entries": entries,
                    }),
                )
            }
        })
        .await;

    let b = bridge;
    server
        .register_handler(Method::WhitelistReload, move |req| {
            let bridge = b.clone();
            async move {
                match bridge.whitelist_reload() {
                    Ok(count) => Response::success(
                        &req.id,
                        serde_json::json!({ "ok": true, "count": count }),
                    ),
                    Err(e) => bridge_error_response(&req.id, &e),
                }
            }
        })
        .await;

    info!("Registered whitelist handlers");
}
