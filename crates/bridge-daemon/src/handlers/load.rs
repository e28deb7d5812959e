//! Load (dimmer) set and read handlers.

use super::{bridge_error_response, headers_json, parse_params};
use bridge_engine::{Bridge, FadeSpec};
use bridge_ipc::{IpcServer, Method, Response};
use qlink_protocol::LoadAddress;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::info;

/// Tri-state fade: absent means "use the default", an explicit `null` means
/// "omit fade from the wire command", a number is used as given.
#[derive(Debug, Clone, Copy, Default)]
enum FadeField {
    #[default]
    Unspecified,
    Null,
    Seconds(f32),
}

impl FadeField {
    fn to_spec(self) -> FadeSpec {
        match self {
            FadeField::Unspecified => FadeSpec::Default,
            FadeField::Null => FadeSpec::Omit,
            FadeField::Seconds(s) => FadeSpec::Seconds(s),
        }
    }
}

fn deserialize_fade<'de, D>(deserializer: D) -> Result<FadeField, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f32>::deserialize(deserializer)?;
    Ok(match value {
        Some(s) => FadeField::Seconds(s),
        None => FadeField::Null,
    })
}

#[derive(Deserialize)]
struct LoadSetParams {
    master: u16,
    enclosure: u8,
    module: u8,
    load: u8,
    level: u8,
    #[serde(default, deserialize_with = "deserialize_fade")]
    fade: FadeField,
    #[serde(default)]
    max_ms: Option<u64>,
}

#[derive(Deserialize)]
struct LoadReadParams {
    master: u16,
    enclosure: u8,
    module: u8,
    load: u8,
    #[serde(default)]
    cache_ms: Option<u64>,
    #[serde(default)]
    max_ms: Option<u64>,
    #[serde(default)]
    format: Option<String>,
}

fn parse_load_addr(
    id: &str,
    master: u16,
    enclosure: u8,
    module: u8,
    load: u8,
) -> Result<LoadAddress, Response> {
    LoadAddress::new(master, enclosure, module, load).map_err(|e| {
        Response::error(
            id,
            bridge_ipc::error_codes::INVALID_PARAMS,
            &e.to_string(),
        )
    })
}

/// Register load handlers.
pub async fn register(server: &IpcServer, bridge: Arc<Bridge>) {
    let b = bridge.clone();
    server
        .register_handler(Method::LoadSet, move |req| {
            let bridge = b.clone();
            async move {
                let params: LoadSetParams = match parse_params(&req) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                let addr = match parse_load_addr(
                    &req.id,
                    params.master,
                    params.enclosure,
                    params.module,
                    params.load,
                ) {
                    Ok(a) => a,
                    Err(resp) => return resp,
                };

                match bridge
                    .load_set(addr, params.level, params.fade.to_spec(), params.max_ms)
                    .await
                {
                    Ok(outcome) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "ok": true,
                            "level": outcome.level,
                            "fade": outcome.fade,
                            "source": outcome.source.as_str(),
                            "raw": outcome.raw,
                            "headers": headers_json(&outcome.headers()),
                        }),
                    ),
                    Err(e) => bridge_error_response(&req.id, &e),
                }
            }
        })
        .await;

    let b = bridge;
    server
        .register_handler(Method::LoadRead, move |req| {
            let bridge = b.clone();
            async move {
                let params: LoadReadParams = match parse_params(&req) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                let addr = match parse_load_addr(
                    &req.id,
                    params.master,
                    params.enclosure,
                    params.module,
                    params.load,
                ) {
                    Ok(a) => a,
                    Err(resp) => return resp,
                };

                match bridge.load_read(addr, params.cache_ms, params.max_ms).await {
                    Ok(reading) => {
                        let body = match params.format.as_deref() {
                            Some("level") => serde_json::json!(reading.level.to_string()),
                            Some("raw") => serde_json::json!(reading.raw),
                            _ => serde_json::json!({
                                "level": reading.level,
                                "fade": reading.fade,
                            }),
                        };
                        Response::success(
                            &req.id,
                            serde_json::json!({
                                "level": reading.level,
                                "fade": reading.fade,
                                "source": reading.source.as_str(),
                                "cache": reading.cache_state.as_str(),
                                "age_ms": reading.age_ms,
                                "body": body,
                                "headers": headers_json(&reading.headers()),
                            }),
                        )
                    }
                    Err(e) => bridge_error_response(&req.id, &e),
                }
            }
        })
        .await;

    info!("Registered load handlers");
}
