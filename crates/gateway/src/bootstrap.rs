//! `AppState` construction and background-task spawning, extracted from
//! `main.rs` so `serve` and `config validate` share the same boot path
//! without standing up a listener.

use std::sync::Arc;

use i3g_domain::config::{Config, ConfigSeverity};
use i3g_router_link::{LinkEvent, RouterLinkBuilder};
use i3g_state::GatewayState;
use i3g_wire::Packet;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel_history::ChannelHistory;
use crate::correlation::CorrelationMap;
use crate::events::{Event, EventBus};
use crate::oob_auth::AuthTokenRegistry;
use crate::ratelimit::RateLimiter;
use crate::registry;
use crate::session::SessionManager;
use crate::state::AppState;

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`] plus the join handle for the router-link supervisor task.
/// This is the shared boot path used by the `serve` command.
pub fn build_app_state(config: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let gateway_state = Arc::new(GatewayState::load(&config.state));
    tracing::info!(path = %config.state.persist_path, "gateway state loaded");

    let sessions = Arc::new(SessionManager::new(&config.api.auth));
    let rate_limiter = Arc::new(RateLimiter::new(config.api.rate_limits.clone()));
    let events = Arc::new(EventBus::new());
    let correlation = Arc::new(CorrelationMap::new());
    let auth_tokens = Arc::new(AuthTokenRegistry::new());
    let channel_history = Arc::new(ChannelHistory::new());
    tracing::info!("API plane ready (sessions, rate limiter, event bus, correlation map)");

    let (outbound_tx, outbound_rx) = mpsc::channel::<Packet>(1024);
    let (reconnect_tx, reconnect_rx) = mpsc::channel::<()>(1);

    let state = AppState {
        config,
        gateway_state,
        outbound_tx,
        reconnect_tx,
        sessions,
        rate_limiter,
        events,
        correlation,
        channel_history,
        auth_tokens,
        shutdown,
    };

    spawn_router_supervisor(state.clone(), outbound_rx, reconnect_rx);
    spawn_janitors(&state);
    tracing::info!("background tasks spawned");

    Ok(state)
}

/// Own the router link's whole lifecycle: dial, run the handshake/session
/// loop via `i3g-router-link`, dispatch every inbound packet to the
/// service registry, and respawn on demand when the admin `reconnect`
/// method fires. `i3g-router-link` itself has no notion of a manual
/// reconnect trigger, so the indirection lives here: `state.outbound_tx`
/// is a stable channel this task drains and forwards to whichever
/// `RouterLink` instance is currently alive.
fn spawn_router_supervisor(
    state: AppState,
    mut outbound_rx: mpsc::Receiver<Packet>,
    mut reconnect_rx: mpsc::Receiver<()>,
) {
    let current_link_tx: Arc<RwLock<Option<mpsc::Sender<Packet>>>> = Arc::new(RwLock::new(None));

    // Forwards packets handed to `state.outbound_tx` to whichever link is
    // currently live, dropping them (with a log) if none is connected yet.
    {
        let current_link_tx = current_link_tx.clone();
        tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                let link_tx = current_link_tx.read().clone();
                match link_tx {
                    Some(tx) => {
                        if tx.send(packet).await.is_err() {
                            tracing::warn!("router link outbound channel closed, packet dropped");
                        }
                    }
                    None => tracing::warn!("no router link connected yet, packet dropped"),
                }
            }
        });
    }

    let (events_tx, mut events_rx) = mpsc::channel::<LinkEvent>(256);

    // Dispatches every inbound packet the link reports to the service
    // registry, and turns handshake/disconnect events into trace logs and
    // fanned-out API events.
    {
        let state = state.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    LinkEvent::Connecting { router_name } => {
                        tracing::info!(router = %router_name, "connecting to router");
                    }
                    LinkEvent::HandshakeCompleted { router_name, mudlist_id, chanlist_id } => {
                        state.gateway_state.stats.record_reconnect();
                        i3g_domain::trace::TraceEvent::HandshakeCompleted {
                            router: router_name.clone(),
                            mudlist_id,
                            chanlist_id,
                        }
                        .emit();
                        state.events.publish(Event::GatewayReconnected { router_name });
                    }
                    LinkEvent::PacketReceived(packet) => {
                        let reply = registry::handle_inbound(
                            packet,
                            &state.gateway_state,
                            &state.events,
                            &state.correlation,
                            &state.auth_tokens,
                            &state.channel_history,
                            &state.config.mud.name,
                        );
                        if let Some(reply) = reply {
                            if state.outbound_tx.send(reply).await.is_err() {
                                tracing::warn!("outbound channel closed while sending a reply packet");
                            }
                        }
                    }
                    LinkEvent::Disconnected { router_name, reason } => {
                        tracing::warn!(router = %router_name, reason = %reason, "router link disconnected");
                    }
                    LinkEvent::Failover { from, to } => {
                        i3g_domain::trace::TraceEvent::RouterFailover {
                            from: from.clone(),
                            to: to.clone(),
                            consecutive_failures: 0,
                        }
                        .emit();
                        tracing::warn!(from = %from, to = %to, "failing over to next router endpoint");
                    }
                }
            }
        });
    }

    // Supervisor: (re)spawn the link until shutdown, respawning
    // immediately whenever the admin `reconnect` method signals.
    tokio::spawn(async move {
        loop {
            if state.is_shutting_down() {
                return;
            }

            let link = match RouterLinkBuilder::new()
                .router_config(state.config.router.clone())
                .mud_config(state.config.mud.clone())
                .build()
            {
                Ok(link) => link,
                Err(e) => {
                    tracing::error!(error = %e, "router link config rejected, not connecting");
                    return;
                }
            };

            let link_shutdown = state.shutdown.child_token();
            let (link_tx, handle) = link.spawn(
                state.gateway_state.clone() as Arc<dyn i3g_router_link::LinkState>,
                events_tx.clone(),
                link_shutdown.clone(),
            );
            *current_link_tx.write() = Some(link_tx);

            tokio::select! {
                _ = state.shutdown.cancelled() => {
                    link_shutdown.cancel();
                    let _ = handle.await;
                    return;
                }
                _ = reconnect_rx.recv() => {
                    tracing::info!("admin reconnect requested, respawning router link");
                    link_shutdown.cancel();
                    let _ = handle.await;
                    continue;
                }
                result = handle => {
                    tracing::warn!(?result, "router link task ended, respawning");
                    continue;
                }
            }
        }
    });
}

/// Periodic maintenance tasks: session timeout sweep, cache TTL expiry,
/// auth-token expiry, metrics snapshot, and state persistence.
fn spawn_janitors(state: &AppState) {
    spawn_interval(state, 30, |state| {
        let removed = state.sessions.sweep_expired();
        if removed > 0 {
            tracing::info!(removed, "swept expired API sessions");
        }
    });

    spawn_interval(state, 10, |state| {
        let removed = state.gateway_state.sweep_caches();
        if removed > 0 {
            tracing::debug!(removed, "swept expired response cache entries");
        }
    });

    spawn_interval(state, 60, |state| {
        let removed = state.auth_tokens.sweep_expired();
        if removed > 0 {
            tracing::debug!(removed, "swept expired OOB auth tokens");
        }
    });

    spawn_interval(state, 10, |state| {
        let snapshot = state.gateway_state.stats_snapshot();
        tracing::debug!(?snapshot, "stats snapshot");
    });

    spawn_interval(state, 60, |state| {
        if let Err(e) = state.gateway_state.flush() {
            tracing::warn!(error = %e, "state snapshot flush failed");
        }
    });
}

/// Run `tick` every `period_secs` seconds until shutdown is requested.
fn spawn_interval(state: &AppState, period_secs: u64, tick: impl Fn(&AppState) + Send + 'static) {
    let state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(period_secs));
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => return,
                _ = interval.tick() => tick(&state),
            }
        }
    });
}
