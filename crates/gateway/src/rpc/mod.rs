//! JSON-RPC 2.0 request/response envelope and the shared dispatch entry
//! point both transports (WebSocket, line-delimited TCP) call into.
//!
//! One connection owns one mutable `Option<Arc<ApiSession>>` — the
//! session it authenticated as, or restored by `session_id`. Everything
//! else is reached through `AppState`, which is `Clone` and cheap to
//! share across the connection's reader and writer tasks.

pub mod methods;
pub mod tcp;
pub mod ws;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{ApiError, ApiErrorCode};
use crate::session::ApiSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Absent `id` marks a notification — handled, never answered.
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub id: Value,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id }
    }

    fn error(id: Value, error: ApiError) -> Self {
        Self { jsonrpc: "2.0", result: None, error: Some(error), id }
    }
}

/// Parse one inbound text frame/line — a single request object or a batch
/// array — and produce the response(s) to send back, in the same order,
/// skipping notifications. `None` means nothing to write (an all-notification
/// batch, or a single notification).
pub async fn handle_text(
    state: &AppState,
    session: &mut Option<Arc<ApiSession>>,
    text: &str,
) -> Option<Value> {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return Some(
                serde_json::to_value(RpcResponse::error(
                    Value::Null,
                    ApiError::parse_error(e.to_string()),
                ))
                .unwrap(),
            )
        }
    };

    match parsed {
        Value::Array(items) => {
            if items.is_empty() {
                return Some(
                    serde_json::to_value(RpcResponse::error(
                        Value::Null,
                        ApiError::invalid_request("empty batch"),
                    ))
                    .unwrap(),
                );
            }
            let mut responses = Vec::new();
            for item in items {
                if let Some(resp) = handle_one(state, session, item).await {
                    responses.push(resp);
                }
            }
            if responses.is_empty() {
                None
            } else {
                Some(Value::Array(responses.into_iter().map(|r| serde_json::to_value(r).unwrap()).collect()))
            }
        }
        single => handle_one(state, session, single)
            .await
            .map(|r| serde_json::to_value(r).unwrap()),
    }
}

async fn handle_one(
    state: &AppState,
    session: &mut Option<Arc<ApiSession>>,
    raw: Value,
) -> Option<RpcResponse> {
    let req: RpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => return Some(RpcResponse::error(Value::Null, ApiError::invalid_request(e.to_string()))),
    };
    let id = req.id.clone();
    let is_notification = id.is_none();

    let result = route(state, session, &req.method, req.params).await;
    if is_notification {
        return None;
    }
    Some(match result {
        Ok(value) => RpcResponse::success(id.unwrap_or(Value::Null), value),
        Err(err) => RpcResponse::error(id.unwrap_or(Value::Null), err),
    })
}

async fn route(
    state: &AppState,
    session: &mut Option<Arc<ApiSession>>,
    method: &str,
    params: Value,
) -> Result<Value, ApiError> {
    if state.is_shutting_down() {
        return Err(ApiError::new(ApiErrorCode::GatewayShuttingDown, "gateway is shutting down"));
    }

    if method == "authenticate" {
        return methods::authenticate(state, session, params).await;
    }
    if method == "ping" {
        return Ok(Value::String("pong".into()));
    }

    if session.is_none() {
        if let Some(sid) = params.get("session_id").and_then(Value::as_str) {
            *session = state.sessions.restore(sid);
        }
    }
    let Some(sess) = session.clone() else {
        return Err(ApiError::not_authenticated());
    };

    if let Some(permission) = methods::required_permission(method) {
        if !sess.has_permission(permission) {
            return Err(ApiError::permission_denied(permission));
        }
    }
    if !state.rate_limiter.check_and_consume(&sess.session_id, method) {
        return Err(ApiError::rate_limited(method));
    }
    state.gateway_state.stats.record_rpc_request();

    let outcome = methods::dispatch(state, &sess, method, params).await;
    if outcome.is_err() {
        state.gateway_state.stats.record_rpc_error();
    }
    outcome
}

/// Spawn the task that forwards one session's fanned-out events to its
/// connection's outbound channel, as `{"jsonrpc":"2.0","method":"event",...}`
/// notifications. Shared by both transports; the caller aborts the handle
/// on disconnect.
pub(crate) fn spawn_event_forwarder(
    state: AppState,
    session: Arc<ApiSession>,
    outbound_tx: mpsc::Sender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let queue = state.events.subscribe(&session.session_id, &[]);
        loop {
            queue.notify.notified().await;
            for event in queue.drain() {
                let frame = json!({ "jsonrpc": "2.0", "method": "event", "params": event });
                if outbound_tx.send(frame.to_string()).await.is_err() {
                    return;
                }
            }
        }
    })
}
