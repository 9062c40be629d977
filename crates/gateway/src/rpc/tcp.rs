//! Line-delimited JSON-RPC over TCP: the same request handler as the
//! WebSocket transport, one JSON object per line, UTF-8, newline-terminated
//! in both directions.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::rpc::{self, spawn_event_forwarder};
use crate::session::ApiSession;
use crate::state::AppState;

/// Matches the JSON-RPC request size ceiling shared with the WebSocket
/// transport; a line over this is dropped rather than buffered unbounded.
const MAX_LINE_BYTES: usize = 1024 * 1024;

pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else { continue };
                let state = state.clone();
                let conn_shutdown = shutdown.child_token();
                tokio::spawn(async move {
                    tracing::debug!(%peer, "tcp api connection accepted");
                    handle_connection(stream, state, conn_shutdown).await;
                });
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: AppState, shutdown: CancellationToken) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Arc<ApiSession>> = None;
    let mut event_forwarder: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = lines.next_line() => match read {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            },
        };
        if line.len() > MAX_LINE_BYTES {
            continue;
        }
        let Some(response) = rpc::handle_text(&state, &mut session, &line).await else {
            continue;
        };
        if outbound_tx.send(response.to_string()).await.is_err() {
            break;
        }
        if event_forwarder.is_none() {
            if let Some(sess) = &session {
                event_forwarder = Some(spawn_event_forwarder(state.clone(), sess.clone(), outbound_tx.clone()));
            }
        }
    }

    if let Some(handle) = event_forwarder {
        handle.abort();
    }
    writer.abort();
    if let Some(sess) = session {
        state.events.remove_session(&sess.session_id);
        state.rate_limiter.forget_session(&sess.session_id);
        tracing::debug!(session_id = %sess.session_id, "tcp session disconnected");
    }
}
