//! Connection manager: dials a preferred router endpoint, performs the
//! `startup-req-3` handshake, and runs the read/write/idle-timeout loop.
//! Reconnects with jittered backoff and fails over to the next configured
//! endpoint after repeated failures on the current one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use i3g_domain::config::{MudConfig, RouterConfig};
use i3g_wire::{
    decode_packet, encode_frame, encode_packet, FrameDecoder, LpcValue, Packet, PacketBody,
    PacketHeader, StartupReq3Body,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};
use crate::reconnect::ReconnectBackoff;
use crate::session::{LinkEvent, LinkState};

/// Sustained connected duration after which the backoff/failover counters
/// reset, per the reconnect policy.
const BACKOFF_RESET_THRESHOLD: Duration = Duration::from_secs(30);

/// How long to stay on a session after `startup-reply` names a different
/// preferred router before tearing it down to reconnect there.
const PREFERRED_ROUTER_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Outcome of one connection lifecycle.
struct ConnectOutcome {
    connected_for: Duration,
    /// Index into `self.router.endpoints` of a router the handshake named
    /// as preferred, if it differs from the one we're connected to and is
    /// one of our configured endpoints.
    switch_to: Option<usize>,
}

/// A fully-configured connection manager, ready to run against its
/// preferred router endpoint list.
///
/// Create via [`RouterLink::builder`].
pub struct RouterLink {
    pub(crate) router: RouterConfig,
    pub(crate) mud: MudConfig,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) outbound_queue_size: usize,
}

impl RouterLink {
    /// Start a new builder.
    pub fn builder() -> crate::builder::RouterLinkBuilder {
        crate::builder::RouterLinkBuilder::new()
    }

    /// Spawn the connection manager on its own task. Returns a sender for
    /// outbound packets and a handle that resolves when the link gives up
    /// for good (every endpoint exhausted, or shutdown requested).
    pub fn spawn(
        self,
        state: Arc<dyn LinkState>,
        events_tx: mpsc::Sender<LinkEvent>,
        shutdown: CancellationToken,
    ) -> (mpsc::Sender<Packet>, tokio::task::JoinHandle<Result<()>>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_queue_size);
        let handle =
            tokio::spawn(async move { self.run(state, events_tx, outbound_rx, shutdown).await });
        (outbound_tx, handle)
    }

    /// Run the reconnect/failover loop until shutdown or every endpoint is
    /// exhausted. Reconnect attempts are counted per endpoint; after
    /// `reconnect_backoff.max_attempts` consecutive failures on the
    /// current endpoint, the manager advances to the next one.
    pub async fn run(
        self,
        state: Arc<dyn LinkState>,
        events_tx: mpsc::Sender<LinkEvent>,
        mut outbound_rx: mpsc::Receiver<Packet>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut endpoint_idx = 0usize;
        let mut attempt = 0u32;

        loop {
            if shutdown.is_cancelled() {
                return Err(LinkError::Shutdown);
            }

            let endpoint = self.router.endpoints[endpoint_idx].clone();
            let _ = events_tx
                .send(LinkEvent::Connecting {
                    router_name: endpoint.name.clone(),
                })
                .await;

            let outcome = tokio::select! {
                r = self.connect_and_run(&endpoint, &state, &events_tx, &mut outbound_rx) => r,
                _ = shutdown.cancelled() => {
                    tracing::info!(router = %endpoint.name, "shutdown requested");
                    return Err(LinkError::Shutdown);
                }
            };

            let mut preferred_switch = None;
            match outcome {
                Ok(ConnectOutcome { switch_to: Some(idx), .. }) => {
                    let preferred = self.router.endpoints[idx].name.clone();
                    tracing::info!(router = %endpoint.name, preferred = %preferred, "switching to router-preferred endpoint");
                    preferred_switch = Some(idx);
                }
                Ok(ConnectOutcome { connected_for, .. }) if connected_for >= BACKOFF_RESET_THRESHOLD => {
                    tracing::info!(router = %endpoint.name, "connection closed after a stable session, resetting backoff");
                    attempt = 0;
                }
                Ok(_) => {
                    tracing::warn!(router = %endpoint.name, "connection closed before it stabilized");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(router = %endpoint.name, attempt, error = %e, "connect failed");
                    attempt += 1;
                }
            }

            if let Some(idx) = preferred_switch {
                endpoint_idx = idx;
                attempt = 0;
                continue;
            }

            if self.reconnect_backoff.should_give_up(attempt) {
                let next_idx = (endpoint_idx + 1) % self.router.endpoints.len();
                let next_name = self.router.endpoints[next_idx].name.clone();
                tracing::warn!(
                    from = %endpoint.name,
                    to = %next_name,
                    attempts = attempt,
                    "failing over to next router endpoint"
                );
                let _ = events_tx
                    .send(LinkEvent::Failover {
                        from: endpoint.name.clone(),
                        to: next_name,
                    })
                    .await;
                endpoint_idx = next_idx;
                attempt = 0;
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(LinkError::Shutdown),
            }
        }
    }

    /// Single connection lifecycle: connect, handshake, message loop with
    /// idle-timeout detection. Returns how long the session stayed
    /// connected (used by the caller to decide whether to reset backoff)
    /// and, if `startup-reply` named a different preferred router, the
    /// endpoint index to switch to.
    async fn connect_and_run(
        &self,
        endpoint: &i3g_domain::config::RouterEndpoint,
        state: &Arc<dyn LinkState>,
        events_tx: &mpsc::Sender<LinkEvent>,
        outbound_rx: &mut mpsc::Receiver<Packet>,
    ) -> Result<ConnectOutcome> {
        let addr = format!("{}:{}", endpoint.host, endpoint.port);
        tracing::info!(router = %endpoint.name, addr = %addr, "connecting");
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| LinkError::Connect(format!("{addr}: {e}")))?;

        let handshake_timeout = Duration::from_secs(self.router.handshake_timeout_secs);
        let idle_timeout = Duration::from_secs(self.router.idle_timeout_secs);

        let started = Instant::now();
        self.send_handshake(&mut stream, endpoint, state).await?;

        let mut decoder = FrameDecoder::default();
        let reply =
            wait_for_handshake_reply(&mut stream, &mut decoder, handshake_timeout).await?;
        if let Some(password) = reply.new_password {
            state.set_router_password(&endpoint.name, password);
        }

        let _ = events_tx
            .send(LinkEvent::HandshakeCompleted {
                router_name: endpoint.name.clone(),
                mudlist_id: reply.mudlist_id,
                chanlist_id: reply.chanlist_id,
            })
            .await;
        tracing::info!(
            router = %endpoint.name,
            mudlist_id = reply.mudlist_id,
            chanlist_id = reply.chanlist_id,
            router_list = ?reply.router_list,
            "handshake completed"
        );

        let preferred_idx =
            preferred_endpoint_index(&self.router.endpoints, &endpoint.name, &reply.router_list);
        let settle_armed = preferred_idx.is_some();
        if let Some(idx) = preferred_idx {
            tracing::info!(
                router = %endpoint.name,
                preferred = %self.router.endpoints[idx].name,
                settle_secs = PREFERRED_ROUTER_SETTLE_DELAY.as_secs(),
                "router list names a different preferred endpoint, settling before reconnect"
            );
        }
        let settle_sleep = tokio::time::sleep(PREFERRED_ROUTER_SETTLE_DELAY);
        tokio::pin!(settle_sleep);

        let mut read_buf = vec![0u8; 64 * 1024];
        loop {
            tokio::select! {
                _ = &mut settle_sleep, if settle_armed => {
                    let _ = events_tx.send(LinkEvent::Disconnected {
                        router_name: endpoint.name.clone(),
                        reason: "settling to router-preferred endpoint".into(),
                    }).await;
                    return Ok(ConnectOutcome { connected_for: started.elapsed(), switch_to: preferred_idx });
                }
                read_result = tokio::time::timeout(idle_timeout, stream.read(&mut read_buf)) => {
                    let n = match read_result {
                        Ok(Ok(0)) => {
                            let _ = events_tx.send(LinkEvent::Disconnected {
                                router_name: endpoint.name.clone(),
                                reason: "connection closed by router".into(),
                            }).await;
                            return Ok(ConnectOutcome { connected_for: started.elapsed(), switch_to: None });
                        }
                        Ok(Ok(n)) => n,
                        Ok(Err(e)) => return Err(LinkError::Io(e)),
                        Err(_) => {
                            let _ = events_tx.send(LinkEvent::Disconnected {
                                router_name: endpoint.name.clone(),
                                reason: "idle_timeout".into(),
                            }).await;
                            return Ok(ConnectOutcome { connected_for: started.elapsed(), switch_to: None });
                        }
                    };
                    decoder.push(&read_buf[..n]);
                    while let Some(value) = decoder.try_next()? {
                        let packet = decode_packet(value)?;
                        let _ = events_tx.send(LinkEvent::PacketReceived(packet)).await;
                    }
                }
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(packet) => {
                            let frame = encode_frame(&encode_packet(&packet));
                            stream.write_all(&frame).await?;
                        }
                        None => {
                            // Outbound channel closed: sender side shut down.
                            return Ok(ConnectOutcome { connected_for: started.elapsed(), switch_to: None });
                        }
                    }
                }
            }
        }
    }

    async fn send_handshake(
        &self,
        stream: &mut TcpStream,
        endpoint: &i3g_domain::config::RouterEndpoint,
        state: &Arc<dyn LinkState>,
    ) -> Result<()> {
        let services = self
            .mud
            .services
            .iter()
            .map(|(k, v)| {
                let n = v.as_i64().unwrap_or(1);
                (i3g_wire::LpcValue::Str(k.clone()), i3g_wire::LpcValue::Int(n))
            })
            .collect();

        let packet = Packet {
            header: PacketHeader {
                kind: "startup-req-3".into(),
                ttl: 200,
                orig_mud: self.mud.name.clone(),
                orig_user: None,
                target_mud: None,
                target_user: None,
            },
            body: PacketBody::StartupReq3(StartupReq3Body {
                password: state.router_password(&endpoint.name),
                old_mudlist_id: state.last_mudlist_id(),
                old_chanlist_id: state.last_chanlist_id(),
                player_port: self.mud.player_port as i64,
                imud_tcp_port: self.mud.oob_tcp_port as i64,
                imud_udp_port: 0,
                mudlib: self.mud.mudlib.clone(),
                base_mudlib: self.mud.base_mudlib.clone(),
                driver: self.mud.driver.clone(),
                mud_type: self.mud.mud_type.clone(),
                open_status: if self.mud.open_status == "open" { 1 } else { 0 },
                admin_email: self.mud.admin_email.clone(),
                services,
                other_data: Vec::new(),
            }),
        };

        let frame = encode_frame(&encode_packet(&packet));
        stream.write_all(&frame).await?;
        Ok(())
    }
}

/// Parsed contents of a `startup-reply` packet.
struct HandshakeReply {
    mudlist_id: i64,
    chanlist_id: i64,
    new_password: Option<i64>,
    /// Router names in the order the router prefers them, first entry
    /// being the one it wants everyone connected to.
    router_list: Vec<String>,
}

/// Wait for `startup-reply` (or a handshake-time `error` packet) within
/// `timeout`. Returns the mudlist/chanlist IDs and router list the router
/// tells us about.
async fn wait_for_handshake_reply(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
    timeout: Duration,
) -> Result<HandshakeReply> {
    let mut read_buf = vec![0u8; 64 * 1024];
    let result = tokio::time::timeout(timeout, async {
        loop {
            while let Some(value) = decoder.try_next()? {
                let packet = decode_packet(value)?;
                match packet.body {
                    PacketBody::Raw(ref fields) if packet.header.kind == "startup-reply" => {
                        // Positional per the I3 startup-reply shape: [0] new
                        // password, [1] chanlist_id, [2] mudlist_id, [3]
                        // ordered router list (preferred router first).
                        let new_password = fields.first().and_then(|v| v.as_int());
                        let chanlist_id = fields.get(1).and_then(|v| v.as_int()).unwrap_or(0);
                        let mudlist_id = fields.get(2).and_then(|v| v.as_int()).unwrap_or(0);
                        let router_list = fields.get(3).map(parse_router_list).unwrap_or_default();
                        return Ok(HandshakeReply {
                            mudlist_id,
                            chanlist_id,
                            new_password,
                            router_list,
                        });
                    }
                    PacketBody::Error(e) => {
                        return Err(LinkError::Handshake(format!(
                            "{}: {}",
                            e.error_code, e.error_message
                        )));
                    }
                    _ => continue,
                }
            }
            let n = stream.read(&mut read_buf).await?;
            if n == 0 {
                return Err(LinkError::Handshake("connection closed before startup-reply".into()));
            }
            decoder.push(&read_buf[..n]);
        }
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(LinkError::Handshake("handshake_timeout".into())),
    }
}

/// Extract an ordered list of router names from the `startup-reply` router
/// list field: an array of either plain name strings or `(name, ...)`
/// per-router arrays, matching what routers send in practice.
fn parse_router_list(value: &LpcValue) -> Vec<String> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            LpcValue::Str(name) => Some(name.clone()),
            LpcValue::Array(fields) => fields.first().and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        })
        .collect()
}

/// If `router_list`'s first entry names a configured endpoint other than
/// `current`, return its index.
fn preferred_endpoint_index(
    endpoints: &[i3g_domain::config::RouterEndpoint],
    current: &str,
    router_list: &[String],
) -> Option<usize> {
    let preferred = router_list.first()?;
    if preferred.eq_ignore_ascii_case(current) {
        return None;
    }
    endpoints
        .iter()
        .position(|e| e.name.eq_ignore_ascii_case(preferred))
}

#[cfg(test)]
mod tests {
    use super::*;
    use i3g_domain::config::RouterEndpoint;
    use std::sync::Mutex;

    struct TestState {
        password: Mutex<i64>,
    }

    impl LinkState for TestState {
        fn router_password(&self, _router_name: &str) -> i64 {
            *self.password.lock().unwrap()
        }
        fn set_router_password(&self, _router_name: &str, password: i64) {
            *self.password.lock().unwrap() = password;
        }
        fn last_mudlist_id(&self) -> i64 {
            0
        }
        fn last_chanlist_id(&self) -> i64 {
            0
        }
    }

    fn test_link() -> RouterLink {
        crate::builder::RouterLinkBuilder::new()
            .router_config(i3g_domain::config::RouterConfig {
                endpoints: vec![
                    RouterEndpoint { name: "*router1".into(), host: "127.0.0.1".into(), port: 1 },
                    RouterEndpoint { name: "*router2".into(), host: "127.0.0.1".into(), port: 2 },
                ],
                handshake_timeout_secs: 30,
                idle_timeout_secs: 300,
            })
            .mud_config(i3g_domain::config::MudConfig {
                name: "ExampleMUD".into(),
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_endpoints() {
        let err = crate::builder::RouterLinkBuilder::new()
            .mud_config(i3g_domain::config::MudConfig {
                name: "ExampleMUD".into(),
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn builder_requires_mud_name() {
        let err = crate::builder::RouterLinkBuilder::new()
            .router_config(i3g_domain::config::RouterConfig {
                endpoints: vec![RouterEndpoint {
                    name: "*router1".into(),
                    host: "127.0.0.1".into(),
                    port: 1,
                }],
                handshake_timeout_secs: 30,
                idle_timeout_secs: 300,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[tokio::test]
    async fn connect_failed_is_reported_as_link_error() {
        let link = test_link();
        let state: Arc<dyn LinkState> = Arc::new(TestState { password: Mutex::new(0) });
        let (_tx, mut rx) = mpsc::channel::<Packet>(8);
        let (events_tx, _events_rx) = mpsc::channel(8);

        // Port 1 is privileged/unused in test sandboxes, connect should fail fast.
        let endpoint = link.router.endpoints[0].clone();
        let result = link
            .connect_and_run(&endpoint, &state, &events_tx, &mut rx)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn parse_router_list_accepts_plain_names_or_per_router_arrays() {
        let value = LpcValue::Array(vec![
            LpcValue::Str("*router2".into()),
            LpcValue::Array(vec![
                LpcValue::Str("*router1".into()),
                LpcValue::Str("127.0.0.1".into()),
            ]),
        ]);
        assert_eq!(parse_router_list(&value), vec!["*router2", "*router1"]);
    }

    #[test]
    fn parse_router_list_of_non_array_value_is_empty() {
        assert_eq!(parse_router_list(&LpcValue::Int(0)), Vec::<String>::new());
    }

    #[test]
    fn preferred_endpoint_index_picks_up_a_reordered_head() {
        let link = test_link();
        let idx = preferred_endpoint_index(
            &link.router.endpoints,
            "*router1",
            &["*router2".to_string(), "*router1".to_string()],
        );
        assert_eq!(idx, Some(1));
    }

    #[test]
    fn preferred_endpoint_index_is_none_when_head_matches_current() {
        let link = test_link();
        let idx = preferred_endpoint_index(
            &link.router.endpoints,
            "*router1",
            &["*router1".to_string(), "*router2".to_string()],
        );
        assert_eq!(idx, None);
    }

    #[test]
    fn preferred_endpoint_index_is_none_when_head_is_unconfigured() {
        let link = test_link();
        let idx = preferred_endpoint_index(
            &link.router.endpoints,
            "*router1",
            &["*router3".to_string()],
        );
        assert_eq!(idx, None);
    }

    #[test]
    fn preferred_endpoint_index_is_none_for_an_empty_list() {
        let link = test_link();
        let idx = preferred_endpoint_index(&link.router.endpoints, "*router1", &[]);
        assert_eq!(idx, None);
    }
}
