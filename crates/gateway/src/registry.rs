//! Service registry: dispatches each inbound router packet to the side
//! effect it causes — state mutation, event-bus fan-out, or completing a
//! pending API correlation.
//!
//! `startup-reply` isn't handled here: the connection manager consumes it
//! internally as part of the handshake and reports the outcome as
//! `LinkEvent::HandshakeCompleted`, including writing the router password
//! back through `GatewayState`'s `LinkState` impl.

use i3g_domain::trace::TraceEvent;
use i3g_router_link::LinkState;
use i3g_state::{lpc_to_json, GatewayState};
use i3g_wire::{ErrorBody, LpcValue, Packet, PacketBody, PacketHeader};

use crate::channel_history::ChannelHistory;
use crate::correlation::CorrelationMap;
use crate::events::{Event, EventBus};
use crate::oob_auth::AuthTokenRegistry;

const OUTBOUND_TTL: i64 = 5;

/// Handle one inbound packet. Never panics or returns an error for a
/// malformed-but-decodable packet — unrecognized shapes are logged and
/// dropped, per the "gateway never crashes on one bad packet" rule.
#[allow(clippy::too_many_arguments)]
pub fn handle_inbound(
    packet: Packet,
    state: &GatewayState,
    events: &EventBus,
    correlation: &CorrelationMap,
    auth_tokens: &AuthTokenRegistry,
    history: &ChannelHistory,
    outbound_mud_name: &str,
) -> Option<Packet> {
    state.stats.record_packet_received();

    let header = &packet.header;

    // The gateway isn't a router — it doesn't forward traffic, so any
    // packet addressed to someone else reached us by mistake. Channel
    // broadcasts have no `target_mud` at all and are exempt.
    if let Some(target) = header.target_mud.as_deref() {
        if !target.eq_ignore_ascii_case(outbound_mud_name) {
            tracing::warn!(
                kind = %header.kind,
                target_mud = %target,
                our_mud = %outbound_mud_name,
                "dropping misaddressed packet"
            );
            return Some(Packet {
                header: PacketHeader {
                    kind: "error".into(),
                    ttl: OUTBOUND_TTL,
                    orig_mud: outbound_mud_name.to_string(),
                    orig_user: None,
                    target_mud: Some(header.orig_mud.clone()),
                    target_user: header.orig_user.clone(),
                },
                body: PacketBody::Error(ErrorBody {
                    error_code: "bad-proto".into(),
                    error_message: format!("packet addressed to {target}, not {outbound_mud_name}"),
                    error_packet: None,
                }),
            });
        }
    }

    match &packet.body {
        PacketBody::Tell(body) => {
            events.publish(Event::TellReceived {
                from_mud: header.orig_mud.clone(),
                from_user: body.visname.clone(),
                to_user: header.target_user.clone().unwrap_or_default(),
                message: body.message.clone(),
            });
        }
        PacketBody::Emoteto(body) => {
            events.publish(Event::EmotetoReceived {
                from_mud: header.orig_mud.clone(),
                from_user: body.visname.clone(),
                to_user: header.target_user.clone().unwrap_or_default(),
                message: body.message.clone(),
            });
        }
        PacketBody::ChannelM(body) => {
            history.push(
                &body.channel,
                serde_json::json!({
                    "kind": "channel_message",
                    "from_mud": header.orig_mud,
                    "from_user": body.visname,
                    "message": body.message,
                }),
            );
            events.publish(Event::ChannelMessage {
                channel: body.channel.clone(),
                from_mud: header.orig_mud.clone(),
                from_user: body.visname.clone(),
                message: body.message.clone(),
            });
        }
        PacketBody::ChannelE(body) => {
            history.push(
                &body.channel,
                serde_json::json!({
                    "kind": "channel_emote",
                    "from_mud": header.orig_mud,
                    "from_user": body.visname,
                    "message": body.message,
                }),
            );
            events.publish(Event::ChannelEmote {
                channel: body.channel.clone(),
                from_mud: header.orig_mud.clone(),
                from_user: body.visname.clone(),
                message: body.message.clone(),
            });
        }
        PacketBody::ChannelT(body) => {
            events.publish(Event::ChannelTargetedEmote {
                channel: body.channel.clone(),
                from_mud: header.orig_mud.clone(),
                from_user: body.visname.clone(),
                to_user: body.visname_target.clone(),
                message: body.message_to_target.clone(),
            });
        }
        PacketBody::Mudlist(body) => {
            apply_mudlist_entries(state, events, body.mudlist_id, &body.info);
        }
        PacketBody::MudlistDelta(body) => {
            apply_mudlist_entries(state, events, body.token, &body.delta);
        }
        PacketBody::MudlistAltered(body) => {
            apply_mudlist_entries(state, events, body.token, &body.delta);
        }
        PacketBody::ChanlistDelta(body) => {
            let old_id = state.last_chanlist_id();
            if let Some(new_id) = state.apply_chanlist_delta(body.token, &body.delta) {
                TraceEvent::ChanlistDeltaApplied { old_id, new_id, entries: body.delta.len() }
                    .emit();
            }
        }
        PacketBody::ChanlistAltered(body) => {
            let old_id = state.last_chanlist_id();
            if let Some(new_id) = state.apply_chanlist_altered(body.token, &body.delta) {
                TraceEvent::ChanlistDeltaApplied { old_id, new_id, entries: body.delta.len() }
                    .emit();
            }
        }
        PacketBody::Error(body) => {
            events.publish(Event::ErrorOccurred {
                code: body.error_code.clone(),
                message: body.error_message.clone(),
            });
            if let Some(key) = correlation_key_from_error(header, body.error_packet.as_deref()) {
                correlation.complete(
                    &key,
                    serde_json::json!({
                        "error": { "code": body.error_code, "message": body.error_message }
                    }),
                );
            }
        }
        PacketBody::StartupReq3(_) => {
            // We never receive this — it's the outbound handshake body. A
            // router that echoes it back is misbehaving; ignore.
        }
        PacketBody::Raw(rest) => {
            handle_raw(header, rest, state, correlation, auth_tokens);
        }
    }

    None
}

fn apply_mudlist_entries(
    state: &GatewayState,
    events: &EventBus,
    token: i64,
    entries: &[(LpcValue, LpcValue)],
) {
    let old_id = state.last_mudlist_id();
    let before: Vec<(String, bool)> = entries
        .iter()
        .filter_map(|(k, _)| k.as_str().map(str::to_ascii_lowercase))
        .map(|name| {
            let present = state.lookup_mud(&name).is_some();
            (name, present)
        })
        .collect();

    let Some(new_id) = state.apply_mudlist_altered(token, entries) else {
        return;
    };
    TraceEvent::MudlistDeltaApplied { old_id, new_id, entries: entries.len() }.emit();

    for (name, was_present) in before {
        let now_present = state.lookup_mud(&name).is_some();
        match (was_present, now_present) {
            (false, true) => events.publish(Event::MudOnline { mud_name: name }),
            (true, false) => events.publish(Event::MudOffline { mud_name: name }),
            _ => {}
        }
    }
}

fn handle_raw(
    header: &i3g_wire::PacketHeader,
    rest: &[LpcValue],
    state: &GatewayState,
    correlation: &CorrelationMap,
    auth_tokens: &AuthTokenRegistry,
) -> Option<()> {
    match header.kind.as_str() {
        "who-reply" | "finger-reply" | "locate-reply" => {
            let key = header.target_user.as_deref()?;
            let value = lpc_to_json(&LpcValue::Array(rest.to_vec()));
            let cache_key = format!("{}:{}", header.orig_mud.to_ascii_lowercase(), key);
            match header.kind.as_str() {
                "who-reply" => state.cache_who(&cache_key, value.clone()),
                "finger-reply" => state.cache_finger(&cache_key, value.clone()),
                "locate-reply" => state.cache_locate(&cache_key, value.clone()),
                _ => unreachable!(),
            }
            correlation.complete(key, value);
        }
        "ucache-update" => {
            let user = rest.first()?.as_str()?;
            let info = lpc_to_json(&LpcValue::Array(rest.to_vec()));
            state.update_user_cache(&header.orig_mud, user, info);
        }
        "auth-mud-req" => {
            // Another mud is asking us to vouch for a player. The token
            // travels back via `auth-mud-reply` (encoded by the
            // orchestrator, which owns the outbound sender).
            let (_token, _issued_at) = auth_tokens.issue(&header.orig_mud);
        }
        "shutdown" => {
            tracing::info!(router = %header.orig_mud, "router announced shutdown");
        }
        other => {
            tracing::debug!(kind = %other, "unhandled packet type");
        }
    }
    Some(())
}

/// Find a correlation key on an `error` packet: either the header's own
/// `target_user`, or (more commonly) the `target_user` field embedded in
/// the failed packet the router echoed back.
fn correlation_key_from_error(
    header: &i3g_wire::PacketHeader,
    error_packet: Option<&[LpcValue]>,
) -> Option<String> {
    if let Some(key) = header.target_user.as_deref() {
        if key.starts_with("req-") {
            return Some(key.to_string());
        }
    }
    let fields = error_packet?;
    let key = fields.get(5)?.as_str()?;
    key.starts_with("req-").then(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_history::ChannelHistory;
    use i3g_domain::config::StateConfig;
    use i3g_wire::{PacketHeader, TellBody};

    fn test_state() -> GatewayState {
        let cfg = StateConfig {
            persist_path: std::env::temp_dir()
                .join(format!("i3g-registry-test-{}.json", uuid::Uuid::new_v4()))
                .to_string_lossy()
                .into_owned(),
        };
        GatewayState::load(&cfg)
    }

    fn header(kind: &str, target_user: Option<&str>) -> PacketHeader {
        PacketHeader {
            kind: kind.into(),
            ttl: 200,
            orig_mud: "OtherMUD".into(),
            orig_user: Some("bob".into()),
            target_mud: Some("OurMud".into()),
            target_user: target_user.map(str::to_string),
        }
    }

    #[test]
    fn tell_publishes_an_event() {
        let state = test_state();
        let events = EventBus::new();
        let correlation = CorrelationMap::new();
        let auth = AuthTokenRegistry::new();
        let history = ChannelHistory::new();
        events.subscribe("s1", &["tell_received".to_string()]);

        let packet = Packet {
            header: header("tell", Some("alice")),
            body: PacketBody::Tell(TellBody { visname: "Bob".into(), message: "hi".into() }),
        };
        handle_inbound(packet, &state, &events, &correlation, &auth, &history, "OurMud");

        let drained = events.queue_for("s1").unwrap().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), "tell_received");
    }

    #[test]
    fn misaddressed_packet_is_dropped_with_bad_proto() {
        let state = test_state();
        let events = EventBus::new();
        let correlation = CorrelationMap::new();
        let auth = AuthTokenRegistry::new();
        let history = ChannelHistory::new();
        events.subscribe("s1", &["tell_received".to_string()]);

        let mut misaddressed = header("tell", Some("alice"));
        misaddressed.target_mud = Some("SomeoneElsesMud".into());
        let packet = Packet {
            header: misaddressed,
            body: PacketBody::Tell(TellBody { visname: "Bob".into(), message: "hi".into() }),
        };
        let reply = handle_inbound(packet, &state, &events, &correlation, &auth, &history, "OurMud");

        // Never reaches the tell handler.
        assert!(events.queue_for("s1").unwrap().drain().is_empty());

        let reply = reply.expect("a bad-proto error packet is returned");
        assert_eq!(reply.header.kind, "error");
        assert_eq!(reply.header.target_mud.as_deref(), Some("OtherMUD"));
        match reply.body {
            PacketBody::Error(body) => assert_eq!(body.error_code, "bad-proto"),
            other => panic!("expected an error packet, got {other:?}"),
        }
    }

    #[test]
    fn channel_broadcast_with_no_target_mud_is_not_dropped() {
        let state = test_state();
        let events = EventBus::new();
        let correlation = CorrelationMap::new();
        let auth = AuthTokenRegistry::new();
        let history = ChannelHistory::new();
        events.subscribe("s1", &["channel_message".to_string()]);

        let mut broadcast = header("channel-m", None);
        broadcast.target_mud = None;
        let packet = Packet {
            header: broadcast,
            body: PacketBody::ChannelM(i3g_wire::ChannelMsgBody {
                channel: "chat".into(),
                visname: "Bob".into(),
                message: "hi".into(),
            }),
        };
        let reply = handle_inbound(packet, &state, &events, &correlation, &auth, &history, "OurMud");

        assert!(reply.is_none());
        assert_eq!(events.queue_for("s1").unwrap().drain().len(), 1);
    }

    #[test]
    fn who_reply_completes_correlation_and_caches() {
        let state = test_state();
        let events = EventBus::new();
        let correlation = CorrelationMap::new();
        let auth = AuthTokenRegistry::new();
        let history = ChannelHistory::new();

        let (key, rx) = correlation.begin().unwrap();
        let packet = Packet {
            header: header("who-reply", Some(&key)),
            body: PacketBody::Raw(vec![LpcValue::Array(vec![])]),
        };
        handle_inbound(packet, &state, &events, &correlation, &auth, &history, "OurMud");
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn auth_mud_req_issues_a_token() {
        let state = test_state();
        let events = EventBus::new();
        let correlation = CorrelationMap::new();
        let auth = AuthTokenRegistry::new();
        let history = ChannelHistory::new();

        let packet = Packet {
            header: header("auth-mud-req", None),
            body: PacketBody::Raw(vec![]),
        };
        handle_inbound(packet, &state, &events, &correlation, &auth, &history, "OurMud");
        // auth-mud-req from "OtherMUD" should have minted exactly one
        // outstanding token tied to that mud.
        assert!(auth.sweep_expired() == 0);
    }

    #[test]
    fn mudlist_full_resync_fires_mud_online() {
        let state = test_state();
        let events = EventBus::new();
        let correlation = CorrelationMap::new();
        let auth = AuthTokenRegistry::new();
        let history = ChannelHistory::new();
        events.subscribe("s1", &["mud_online".to_string()]);

        let packet = Packet {
            header: header("mudlist", None),
            body: PacketBody::Mudlist(i3g_wire::MudlistBody {
                mudlist_id: 1,
                info: vec![(LpcValue::Str("ExampleMUD".into()), LpcValue::Int(-1))],
            }),
        };
        handle_inbound(packet, &state, &events, &correlation, &auth, &history, "OurMud");

        let drained = events.queue_for("s1").unwrap().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), "mud_online");
    }
}
