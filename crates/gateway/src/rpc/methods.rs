//! JSON-RPC method table: permission requirements and the handlers
//! themselves. Each handler either answers from local/cached state
//! directly or builds an outbound I3 packet, hands it to the router
//! link, and — for request/reply services — awaits the correlated
//! answer.

use std::sync::Arc;

use i3g_router_link::LinkState;
use i3g_wire::{ChannelMsgBody, LpcValue, Packet, PacketBody, PacketHeader, TellBody};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::events::Event;
use crate::session::ApiSession;
use crate::state::AppState;

/// Initial TTL stamped on every packet this gateway originates. Matches
/// the literal value used throughout the documented wire examples.
const OUTBOUND_TTL: i64 = 5;

/// The permission string each method requires, or `None` for methods
/// reachable before/without one (`authenticate`, `ping` are special-cased
/// in the router and never reach here).
pub fn required_permission(method: &str) -> Option<&'static str> {
    Some(match method {
        "status" => "status",
        "stats" => "stats",
        "tell" => "tell",
        "emoteto" => "emoteto",
        "channel_send" => "channel_send",
        "channel_emote" => "channel_emote",
        "channel_join" => "channel_join",
        "channel_leave" => "channel_leave",
        "channel_list" => "channel_list",
        "channel_who" => "channel_who",
        "channel_history" => "channel_history",
        "who" => "who",
        "finger" => "finger",
        "locate" => "locate",
        "mudlist" => "mudlist",
        "reconnect" => "admin",
        "subscribe" => "subscribe",
        "unsubscribe" => "unsubscribe",
        _ => return None,
    })
}

pub async fn authenticate(
    state: &AppState,
    session: &mut Option<Arc<ApiSession>>,
    params: Value,
) -> Result<Value, ApiError> {
    let api_key = require_str(&params, "api_key")?;
    let authenticated = state
        .sessions
        .authenticate(api_key)
        .ok_or_else(|| ApiError::invalid_params("unknown api_key"))?;
    let result = json!({
        "session_id": authenticated.session_id,
        "mud_name": authenticated.mud_name,
        "permissions": authenticated.permissions,
    });
    *session = Some(authenticated);
    Ok(result)
}

pub async fn dispatch(
    state: &AppState,
    session: &Arc<ApiSession>,
    method: &str,
    params: Value,
) -> Result<Value, ApiError> {
    match method {
        "status" => status(state).await,
        "stats" => stats(state).await,
        "tell" => tell(state, session, params, false).await,
        "emoteto" => tell(state, session, params, true).await,
        "channel_send" => channel_message(state, session, params, false).await,
        "channel_emote" => channel_message(state, session, params, true).await,
        "channel_join" => channel_join(state, session, params, true).await,
        "channel_leave" => channel_join(state, session, params, false).await,
        "channel_list" => channel_list(state).await,
        "channel_who" => channel_who(state, params).await,
        "channel_history" => channel_history(state, params).await,
        "who" => who(state, params).await,
        "finger" => finger(state, params).await,
        "locate" => locate(state, params).await,
        "mudlist" => mudlist(state).await,
        "reconnect" => reconnect(state).await,
        "subscribe" => subscribe(state, session, params, true).await,
        "unsubscribe" => subscribe(state, session, params, false).await,
        other => Err(ApiError::method_not_found(other)),
    }
}

// ── Introspection ────────────────────────────────────────────────────

async fn status(state: &AppState) -> Result<Value, ApiError> {
    Ok(json!({
        "mud_name": state.config.mud.name,
        "mudlist_id": state.gateway_state.last_mudlist_id(),
        "chanlist_id": state.gateway_state.last_chanlist_id(),
        "sessions": state.sessions.len(),
        "pending_correlations": state.correlation.pending_count(),
        "shutting_down": state.is_shutting_down(),
    }))
}

async fn stats(state: &AppState) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(state.gateway_state.stats_snapshot()).unwrap())
}

// ── Tell / emoteto ───────────────────────────────────────────────────

async fn tell(
    state: &AppState,
    session: &Arc<ApiSession>,
    params: Value,
    is_emote: bool,
) -> Result<Value, ApiError> {
    let target_mud = require_str(&params, "target_mud")?;
    let target_user = require_str(&params, "target_user")?;
    let message = require_str(&params, "message")?;
    let from_user = params
        .get("from_user")
        .and_then(Value::as_str)
        .unwrap_or(&session.mud_name);
    let visname = params.get("visname").and_then(Value::as_str).unwrap_or(from_user);

    let packet = build_tell_packet(
        &state.config.mud.name,
        target_mud,
        target_user,
        from_user,
        visname,
        message,
        is_emote,
    );
    send(state, packet).await?;
    Ok(json!({ "sent": true }))
}

/// Pure packet construction — the tell/emoteto arity and visname-default
/// property hold regardless of how the caller reaches this function.
fn build_tell_packet(
    own_mud: &str,
    target_mud: &str,
    target_user: &str,
    from_user: &str,
    visname: &str,
    message: &str,
    is_emote: bool,
) -> Packet {
    let header = PacketHeader {
        kind: if is_emote { "emoteto" } else { "tell" }.to_string(),
        ttl: OUTBOUND_TTL,
        orig_mud: own_mud.to_string(),
        orig_user: Some(from_user.to_string()),
        target_mud: Some(target_mud.to_string()),
        target_user: Some(target_user.to_string()),
    };
    let body = TellBody {
        visname: visname.to_string(),
        message: message.to_string(),
    };
    Packet {
        header,
        body: if is_emote { PacketBody::Emoteto(body) } else { PacketBody::Tell(body) },
    }
}

// ── Channel message / emote ─────────────────────────────────────────

async fn channel_message(
    state: &AppState,
    session: &Arc<ApiSession>,
    params: Value,
    is_emote: bool,
) -> Result<Value, ApiError> {
    let channel = require_str(&params, "channel")?;
    let message = require_str(&params, "message")?;
    let from_user = params
        .get("from_user")
        .and_then(Value::as_str)
        .unwrap_or(&session.mud_name);
    let visname = params.get("visname").and_then(Value::as_str).unwrap_or(from_user);

    let header = PacketHeader {
        kind: if is_emote { "channel-e" } else { "channel-m" }.to_string(),
        ttl: OUTBOUND_TTL,
        orig_mud: state.config.mud.name.clone(),
        orig_user: Some(from_user.to_string()),
        target_mud: None,
        target_user: None,
    };
    let body = ChannelMsgBody {
        channel: channel.to_string(),
        visname: visname.to_string(),
        message: message.to_string(),
    };
    let packet = Packet {
        header,
        body: if is_emote { PacketBody::ChannelE(body) } else { PacketBody::ChannelM(body) },
    };
    send(state, packet).await?;
    Ok(json!({ "sent": true }))
}

/// There's no dedicated wire op for per-session channel membership — the
/// router's chanlist is the directory of channels that exist, not who on
/// our side is listening. Joining/leaving is bookkeeping local to this
/// gateway's event fan-out, surfaced to other sessions as an informational
/// event.
///
/// The event bus filters by event kind only, not by channel, so a session
/// joined to one channel receives `channel_message`/`channel_emote` for all
/// of them; callers that need to tell channels apart read the `channel`
/// field each event carries.
async fn channel_join(
    state: &AppState,
    session: &Arc<ApiSession>,
    params: Value,
    joined: bool,
) -> Result<Value, ApiError> {
    let channel = require_str(&params, "channel")?;
    if !state.gateway_state.get_channels().contains_key(&channel.to_ascii_lowercase()) {
        return Err(ApiError::invalid_params(format!("unknown channel: {channel}")));
    }
    let event_types = vec!["channel_message".to_string(), "channel_emote".to_string()];
    if joined {
        state.events.subscribe(&session.session_id, &event_types);
        state.events.publish(Event::ChannelJoined { channel: channel.to_string(), mud_name: session.mud_name.clone() });
    } else {
        state.events.unsubscribe(&session.session_id, &event_types);
        state.events.publish(Event::ChannelLeft { channel: channel.to_string(), mud_name: session.mud_name.clone() });
    }
    Ok(json!({ "channel": channel, "joined": joined }))
}

async fn channel_list(state: &AppState) -> Result<Value, ApiError> {
    Ok(json!(state.gateway_state.get_channels()))
}

/// Best-effort: the gateway doesn't track per-channel remote membership
/// (no I3 wire op reports it), so this answers from the distinct
/// speakers seen recently in this channel's local scrollback.
async fn channel_who(state: &AppState, params: Value) -> Result<Value, ApiError> {
    let channel = require_str(&params, "channel")?;
    let recent = state.channel_history.recent(channel, 50);
    let mut speakers: Vec<Value> = Vec::new();
    for entry in recent {
        let speaker = json!({ "mud": entry.get("from_mud"), "user": entry.get("from_user") });
        if !speakers.contains(&speaker) {
            speakers.push(speaker);
        }
    }
    Ok(json!({ "channel": channel, "speakers": speakers }))
}

async fn channel_history(state: &AppState, params: Value) -> Result<Value, ApiError> {
    let channel = require_str(&params, "channel")?;
    let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(50).min(50) as usize;
    Ok(json!({ "channel": channel, "messages": state.channel_history.recent(channel, limit) }))
}

// ── Who / finger / locate ────────────────────────────────────────────

async fn who(state: &AppState, params: Value) -> Result<Value, ApiError> {
    let target_mud = require_str(&params, "target_mud")?;
    let (key, rx) = state.correlation.begin().ok_or_else(|| ApiError::internal("too many pending requests"))?;
    let header = PacketHeader {
        kind: "who-req".to_string(),
        ttl: OUTBOUND_TTL,
        orig_mud: state.config.mud.name.clone(),
        orig_user: Some(key.clone()),
        target_mud: Some(target_mud.to_string()),
        target_user: None,
    };
    send(state, Packet { header, body: PacketBody::Raw(vec![]) }).await?;
    state.correlation.wait(key, rx).await
}

async fn finger(state: &AppState, params: Value) -> Result<Value, ApiError> {
    let target_mud = require_str(&params, "target_mud")?;
    let target_user = require_str(&params, "target_user")?;
    let (key, rx) = state.correlation.begin().ok_or_else(|| ApiError::internal("too many pending requests"))?;
    let header = PacketHeader {
        kind: "finger-req".to_string(),
        ttl: OUTBOUND_TTL,
        orig_mud: state.config.mud.name.clone(),
        orig_user: Some(key.clone()),
        target_mud: Some(target_mud.to_string()),
        target_user: None,
    };
    let body = PacketBody::Raw(vec![LpcValue::Str(target_user.to_string())]);
    send(state, Packet { header, body }).await?;
    state.correlation.wait(key, rx).await
}

async fn locate(state: &AppState, params: Value) -> Result<Value, ApiError> {
    let lost_user = require_str(&params, "target_user")?;
    let target_mud = params.get("target_mud").and_then(Value::as_str);
    let (key, rx) = state.correlation.begin().ok_or_else(|| ApiError::internal("too many pending requests"))?;
    let packet = build_locate_req(&state.config.mud.name, &key, target_mud, lost_user);
    send(state, packet).await?;
    state.correlation.wait(key, rx).await
}

/// Pure packet construction — broadcast (no `target_mud`) encodes both
/// `target_mud` and `target_user` as integer zero, never empty string.
fn build_locate_req(own_mud: &str, orig_user: &str, target_mud: Option<&str>, lost_user: &str) -> Packet {
    let header = PacketHeader {
        kind: "locate-req".to_string(),
        ttl: OUTBOUND_TTL,
        orig_mud: own_mud.to_string(),
        orig_user: Some(orig_user.to_string()),
        target_mud: target_mud.map(str::to_string),
        target_user: None,
    };
    Packet {
        header,
        body: PacketBody::Raw(vec![LpcValue::Str(lost_user.to_string())]),
    }
}

// ── Mudlist ──────────────────────────────────────────────────────────

async fn mudlist(state: &AppState) -> Result<Value, ApiError> {
    Ok(json!(state.gateway_state.get_mudlist()))
}

// ── Admin ────────────────────────────────────────────────────────────

async fn reconnect(state: &AppState) -> Result<Value, ApiError> {
    state
        .reconnect_tx
        .try_send(())
        .map_err(|_| ApiError::internal("a reconnect is already in progress"))?;
    Ok(json!({ "reconnecting": true }))
}

// ── Subscriptions ────────────────────────────────────────────────────

async fn subscribe(
    state: &AppState,
    session: &Arc<ApiSession>,
    params: Value,
    subscribing: bool,
) -> Result<Value, ApiError> {
    let event_types: Vec<String> = params
        .get("event_types")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::invalid_params("event_types must be an array of strings"))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if subscribing {
        state.events.subscribe(&session.session_id, &event_types);
    } else {
        state.events.unsubscribe(&session.session_id, &event_types);
    }
    Ok(json!({ "subscribed": subscribing, "event_types": event_types }))
}

// ── Shared plumbing ──────────────────────────────────────────────────

async fn send(state: &AppState, packet: Packet) -> Result<(), ApiError> {
    state
        .outbound_tx
        .send(packet)
        .await
        .map_err(|_| ApiError::internal("router link is not accepting outbound packets"))?;
    state.gateway_state.stats.record_packet_sent();
    Ok(())
}

fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::invalid_params(format!("missing or non-string field: {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tell_round_trip_matches_the_documented_example() {
        let packet = build_tell_packet("OurMud", "TargetMud", "Jane", "john", "john", "hi", false);
        let encoded = i3g_wire::encode_packet(&packet);
        let fields = encoded.as_array().unwrap();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], LpcValue::Str("tell".into()));
        assert_eq!(fields[1], LpcValue::Int(5));
        assert_eq!(fields[2], LpcValue::Str("OurMud".into()));
        assert_eq!(fields[3], LpcValue::Str("john".into()));
        assert_eq!(fields[4], LpcValue::Str("TargetMud".into()));
        assert_eq!(fields[5], LpcValue::Str("jane".into()));
        assert_eq!(fields[6], LpcValue::Str("john".into()));
        assert_eq!(fields[7], LpcValue::Str("hi".into()));
    }

    #[test]
    fn locate_with_no_target_mud_zero_encodes_the_broadcast_fields() {
        let packet = build_locate_req("OurMud", "seeker", None, "lostuser");
        let encoded = i3g_wire::encode_packet(&packet);
        let fields = encoded.as_array().unwrap();
        assert_eq!(
            fields,
            &[
                LpcValue::Str("locate-req".into()),
                LpcValue::Int(5),
                LpcValue::Str("OurMud".into()),
                LpcValue::Str("seeker".into()),
                LpcValue::Int(0),
                LpcValue::Int(0),
                LpcValue::Str("lostuser".into()),
            ]
        );
    }

    #[test]
    fn visname_defaults_to_from_user() {
        let packet = build_tell_packet("OurMud", "TargetMud", "jane", "john", "john", "hi", false);
        match packet.body {
            PacketBody::Tell(b) => assert_eq!(b.visname, "john"),
            other => panic!("expected Tell, got {other:?}"),
        }
    }

    #[test]
    fn required_permission_covers_every_permissioned_method() {
        for method in [
            "status", "stats", "tell", "emoteto", "channel_send", "channel_emote",
            "channel_join", "channel_leave", "channel_list", "channel_who", "channel_history",
            "who", "finger", "locate", "mudlist", "reconnect", "subscribe", "unsubscribe",
        ] {
            assert!(required_permission(method).is_some(), "{method} should require a permission");
        }
        assert_eq!(required_permission("authenticate"), None);
    }

    #[test]
    fn reconnect_requires_the_admin_permission() {
        assert_eq!(required_permission("reconnect"), Some("admin"));
    }
}
