use std::sync::Arc;

use i3g_domain::config::Config;
use i3g_state::GatewayState;
use i3g_wire::Packet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel_history::ChannelHistory;
use crate::correlation::CorrelationMap;
use crate::events::EventBus;
use crate::oob_auth::AuthTokenRegistry;
use crate::ratelimit::RateLimiter;
use crate::session::SessionManager;

/// Shared application state passed to every API handler and to the
/// registry's packet-dispatch function.
///
/// Fields are grouped by concern:
/// - **Core** — config, durable/semi-durable gateway state
/// - **Router link** — the channel that reaches the connection manager
/// - **API plane** — sessions, rate limiting, event fan-out, request
///   correlation
/// - **Security** — OOB auth tokens
/// - **Lifecycle** — cooperative shutdown signal
#[derive(Clone)]
pub struct AppState {
    // ── Core ─────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub gateway_state: Arc<GatewayState>,

    // ── Router link ──────────────────────────────────────────────────
    /// Outbound packets handed to this sender reach the router connection
    /// manager's write half; see `i3g-router-link::RouterLink::spawn`.
    pub outbound_tx: mpsc::Sender<Packet>,
    /// Signals the supervisor task (owned by the bootstrap routine) to
    /// tear down and respawn the current `RouterLink`. Used by the admin
    /// `reconnect` method; a full send just means one is already pending.
    pub reconnect_tx: mpsc::Sender<()>,

    // ── API plane ────────────────────────────────────────────────────
    pub sessions: Arc<SessionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events: Arc<EventBus>,
    pub correlation: Arc<CorrelationMap>,
    pub channel_history: Arc<ChannelHistory>,

    // ── Security ─────────────────────────────────────────────────────
    pub auth_tokens: Arc<AuthTokenRegistry>,

    // ── Lifecycle ────────────────────────────────────────────────────
    pub shutdown: CancellationToken,
}

impl AppState {
    /// `true` once a shutdown has been requested — in-flight API requests
    /// that can't finish before the drain grace elapses should answer
    /// `gateway_shutting_down` instead of blocking.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
