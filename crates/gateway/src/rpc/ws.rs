//! WebSocket transport: one JSON-RPC object per text frame.
//!
//! Grounded on the split-socket, channel-backed-writer shape of a
//! websocket handler, generalized from a bespoke connection-level
//! handshake to a plain request/response loop — sessions authenticate
//! with the `authenticate` method over the already-open connection, not
//! before it, so there's nothing to wait for up front.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::rpc::{self, spawn_event_forwarder};
use crate::session::ApiSession;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Arc<ApiSession>> = None;
    let mut event_forwarder: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => {
                let Some(response) = rpc::handle_text(&state, &mut session, &text).await else {
                    continue;
                };
                if outbound_tx.send(response.to_string()).await.is_err() {
                    break;
                }
                if event_forwarder.is_none() {
                    if let Some(sess) = &session {
                        event_forwarder =
                            Some(spawn_event_forwarder(state.clone(), sess.clone(), outbound_tx.clone()));
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }

    if let Some(handle) = event_forwarder {
        handle.abort();
    }
    writer.abort();
    if let Some(sess) = session {
        state.events.remove_session(&sess.session_id);
        state.rate_limiter.forget_session(&sess.session_id);
        tracing::debug!(session_id = %sess.session_id, "websocket session disconnected");
    }
}
