//! IPC handler registration, one module per handler group.

pub mod health;
pub mod load;
pub mod raw;
pub mod session;
pub mod switch;
pub mod whitelist;

use bridge_engine::{Bridge, BridgeError};
use bridge_ipc::{error_codes, IpcServer, Request, Response};
use std::sync::Arc;
use tracing::info;

/// Register all IPC handlers.
pub async fn register_handlers(server: &IpcServer, bridge: Arc<Bridge>) {
    health::register(server).await;
    session::register(server, bridge.clone()).await;
    switch::register(server, bridge.clone()).await;
    load::register(server, bridge.clone()).await;
    raw::register(server, bridge.clone()).await;
    whitelist::register(server, bridge).await;

    info!("All IPC handlers registered");
}

/// Map a bridge error into an IPC error response. The `http_status` in the
/// error data is what the external router answers with.
pub(crate) fn bridge_error_response(id: &str, err: &BridgeError) -> Response {
    let code = match err {
        BridgeError::InvalidInput(_) => error_codes::INVALID_PARAMS,
        BridgeError::NotConnected => error_codes::NOT_CONNECTED,
        BridgeError::AwaitersSaturated { .. } => error_codes::SATURATED,
        BridgeError::Timeout { .. } | BridgeError::Disconnected => error_codes::TIMEOUT,
        _ => error_codes::INTERNAL_ERROR,
    };
    Response::error_with_data(
        id,
        code,
        &err.to_string(),
        serde_json::json!({ "http_status": err.status_code() }),
    )
}

/// Deserialize request params into a typed struct, or produce the standard
/// invalid-params response.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    request: &Request,
) -> Result<T, Response> {
    let params = request
        .params
        .clone()
        .unwrap_or(serde_json::Value::Object(Default::default()));
    serde_json::from_value(params).map_err(|e| {
        Response::error(
            &request.id,
            error_codes::INVALID_PARAMS,
            &format!("Invalid params: {}", e),
        )
    })
}

/// Render header pairs as a JSON object for the router to copy through.
pub(crate) fn headers_json(headers: &[(&'static str, String)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_response_codes() {
        let resp = bridge_error_response("1", &BridgeError::Timeout { ms: 2000 });
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::TIMEOUT);
        assert_eq!(err.data.unwrap()["http_status"], 504);

        let resp = bridge_error_response(
            "1",
            &BridgeError::AwaitersSaturated {
                key: "2-20-7".to_string(),
            },
        );
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::SATURATED);
        assert_eq!(err.data.unwrap()["http_status"], 429);
    }

    #[test]
    fn test_headers_json() {
        let headers = vec![
            ("X-VGS-Source", "cache".to_string()),
            ("X-VGS-Age", "12".to_string()),
        ];
        let json = headers_json(&headers);
        assert_eq!(json["X-VGS-Source"], "cache");
        assert_eq!(json["X-VGS-Age"], "12");
    }
}
