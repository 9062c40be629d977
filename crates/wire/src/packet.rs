//! Packet model and factory.
//!
//! A registry maps each `type` string to a constructor that validates the
//! array shape and extracts typed fields. The factory is the single point
//! that normalizes `0`-or-empty-string per field and lowercases usernames
//! on outbound packets.

use crate::error::{Result, WireError};
use crate::value::LpcValue;

/// The six fields every I3 packet starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    pub kind: String,
    pub ttl: i64,
    pub orig_mud: String,
    pub orig_user: Option<String>,
    pub target_mud: Option<String>,
    pub target_user: Option<String>,
}

impl PacketHeader {
    fn decode(fields: &[LpcValue]) -> Result<Self> {
        let kind = str_field(fields, 0, "type")?.to_string();
        let ttl = int_field(fields, 1, "ttl")?;
        let orig_mud = str_field(fields, 2, "orig_mud")?.to_string();
        let orig_user = nullable_str_field(fields, 3, "orig_user")?;
        let target_mud = nullable_str_field(fields, 4, "target_mud")?;
        let target_user = nullable_str_field(fields, 5, "target_user")?;
        Ok(Self {
            kind,
            ttl,
            orig_mud,
            orig_user,
            target_mud,
            target_user,
        })
    }

    /// Outbound encoding lowercases usernames, per the factory contract.
    fn encode_into(&self, out: &mut Vec<LpcValue>) {
        out.push(LpcValue::Str(self.kind.clone()));
        out.push(LpcValue::Int(self.ttl));
        out.push(LpcValue::Str(self.orig_mud.clone()));
        out.push(nullable_str_to_lpc(self.orig_user.as_deref().map(str::to_lowercase).as_deref()));
        out.push(nullable_str_to_lpc(self.target_mud.as_deref()));
        out.push(nullable_str_to_lpc(self.target_user.as_deref().map(str::to_lowercase).as_deref()));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed bodies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct TellBody {
    pub visname: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMsgBody {
    pub channel: String,
    pub visname: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTargetedBody {
    pub channel: String,
    pub target_mud: Option<String>,
    pub target_user: Option<String>,
    pub message: String,
    pub message_to_target: String,
    pub visname: String,
    pub visname_target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartupReq3Body {
    pub password: i64,
    pub old_mudlist_id: i64,
    pub old_chanlist_id: i64,
    pub player_port: i64,
    pub imud_tcp_port: i64,
    pub imud_udp_port: i64,
    pub mudlib: String,
    pub base_mudlib: String,
    pub driver: String,
    pub mud_type: String,
    pub open_status: i64,
    pub admin_email: String,
    pub services: Vec<(LpcValue, LpcValue)>,
    pub other_data: Vec<(LpcValue, LpcValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MudlistBody {
    pub mudlist_id: i64,
    pub info: Vec<(LpcValue, LpcValue)>,
}

/// Shared shape for `mudlist-delta`/`mudlist-altered`/`chanlist-delta`/
/// `chanlist-altered` — a token plus a delta mapping where a `0` value
/// means "delete this entry".
#[derive(Debug, Clone, PartialEq)]
pub struct ListDeltaBody {
    pub token: i64,
    pub delta: Vec<(LpcValue, LpcValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub error_code: String,
    pub error_message: String,
    pub error_packet: Option<Vec<LpcValue>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    Tell(TellBody),
    Emoteto(TellBody),
    ChannelM(ChannelMsgBody),
    ChannelE(ChannelMsgBody),
    ChannelT(ChannelTargetedBody),
    StartupReq3(StartupReq3Body),
    Mudlist(MudlistBody),
    MudlistDelta(ListDeltaBody),
    MudlistAltered(ListDeltaBody),
    ChanlistDelta(ListDeltaBody),
    ChanlistAltered(ListDeltaBody),
    Error(ErrorBody),
    /// Everything else (`who-req/reply`, `finger-req/reply`,
    /// `locate-req/reply`, `ucache-update`, `auth-mud-req/reply`,
    /// `oob-req`, `startup-reply`, `chanlist-reply`, `shutdown`, …) —
    /// the gateway's service handlers extract fields positionally; the
    /// wire layer only guarantees these decoded successfully as LPC
    /// values, not their semantic shape.
    Raw(Vec<LpcValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: PacketBody,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Factory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode a complete LPC array (the outermost frame payload) into a
/// typed `Packet`. `bad-pkt` on wrong arity/field types; unrecognized
/// `type` strings still decode, as `PacketBody::Raw`.
pub fn decode_packet(array: LpcValue) -> Result<Packet> {
    let fields = match array {
        LpcValue::Array(f) => f,
        other => {
            return Err(WireError::BadPkt(format!(
                "expected array, got {other:?}"
            )))
        }
    };
    if fields.len() < 6 {
        return Err(WireError::BadPkt(format!(
            "packet has {} fields, need at least 6 for the header",
            fields.len()
        )));
    }
    let header = PacketHeader::decode(&fields)?;
    let rest = &fields[6..];

    let body = match header.kind.as_str() {
        "tell" => {
            check_arity("tell", fields.len(), 8)?;
            PacketBody::Tell(TellBody {
                visname: str_field(rest, 0, "visname")?.to_string(),
                message: str_field(rest, 1, "message")?.to_string(),
            })
        }
        "emoteto" => {
            check_arity("emoteto", fields.len(), 8)?;
            PacketBody::Emoteto(TellBody {
                visname: str_field(rest, 0, "visname")?.to_string(),
                message: str_field(rest, 1, "message")?.to_string(),
            })
        }
        "channel-m" => {
            check_arity("channel-m", fields.len(), 9)?;
            PacketBody::ChannelM(decode_channel_msg(rest)?)
        }
        "channel-e" => {
            check_arity("channel-e", fields.len(), 9)?;
            PacketBody::ChannelE(decode_channel_msg(rest)?)
        }
        "channel-t" => {
            check_arity("channel-t", fields.len(), 13)?;
            PacketBody::ChannelT(ChannelTargetedBody {
                channel: str_field(rest, 0, "channel")?.to_string(),
                target_mud: nullable_str_field(rest, 1, "target_mud")?,
                target_user: nullable_str_field(rest, 2, "target_user")?,
                message: str_field(rest, 3, "message")?.to_string(),
                message_to_target: str_field(rest, 4, "message_to_target")?.to_string(),
                visname: str_field(rest, 5, "visname")?.to_string(),
                visname_target: str_field(rest, 6, "visname_target")?.to_string(),
            })
        }
        "startup-req-3" => {
            check_arity("startup-req-3", fields.len(), 20)?;
            PacketBody::StartupReq3(StartupReq3Body {
                password: int_field(rest, 0, "password")?,
                old_mudlist_id: int_field(rest, 1, "old_mudlist_id")?,
                old_chanlist_id: int_field(rest, 2, "old_chanlist_id")?,
                player_port: int_field(rest, 3, "player_port")?,
                imud_tcp_port: int_field(rest, 4, "imud_tcp_port")?,
                imud_udp_port: int_field(rest, 5, "imud_udp_port")?,
                mudlib: str_field(rest, 6, "mudlib")?.to_string(),
                base_mudlib: str_field(rest, 7, "base_mudlib")?.to_string(),
                driver: str_field(rest, 8, "driver")?.to_string(),
                mud_type: str_field(rest, 9, "mud_type")?.to_string(),
                open_status: int_field(rest, 10, "open_status")?,
                admin_email: str_field(rest, 11, "admin_email")?.to_string(),
                services: map_field(rest, 12, "services")?,
                other_data: map_field(rest, 13, "other_data")?,
            })
        }
        "mudlist" => {
            check_arity("mudlist", fields.len(), 8)?;
            PacketBody::Mudlist(MudlistBody {
                mudlist_id: int_field(rest, 0, "mudlist_id")?,
                info: map_field(rest, 1, "info_mapping")?,
            })
        }
        "mudlist-delta" => PacketBody::MudlistDelta(decode_list_delta(rest)?),
        "mudlist-altered" => PacketBody::MudlistAltered(decode_list_delta(rest)?),
        "chanlist-delta" => PacketBody::ChanlistDelta(decode_list_delta(rest)?),
        "chanlist-altered" => PacketBody::ChanlistAltered(decode_list_delta(rest)?),
        "error" => {
            check_arity("error", fields.len(), 9)?;
            PacketBody::Error(ErrorBody {
                error_code: str_field(rest, 0, "error_code")?.to_string(),
                error_message: str_field(rest, 1, "error_message")?.to_string(),
                error_packet: match rest.get(2) {
                    Some(LpcValue::Int(0)) | None => None,
                    Some(LpcValue::Array(a)) => Some(a.clone()),
                    Some(other) => {
                        return Err(WireError::BadPkt(format!(
                            "error_packet: expected array or 0, got {other:?}"
                        )))
                    }
                },
            })
        }
        _ => PacketBody::Raw(rest.to_vec()),
    };

    Ok(Packet { header, body })
}

fn decode_channel_msg(rest: &[LpcValue]) -> Result<ChannelMsgBody> {
    Ok(ChannelMsgBody {
        channel: str_field(rest, 0, "channel")?.to_string(),
        visname: str_field(rest, 1, "visname")?.to_string(),
        message: str_field(rest, 2, "message")?.to_string(),
    })
}

fn decode_list_delta(rest: &[LpcValue]) -> Result<ListDeltaBody> {
    Ok(ListDeltaBody {
        token: int_field(rest, 0, "token")?,
        delta: map_field(rest, 1, "delta")?,
    })
}

/// Encode a `Packet` back into the outermost LPC array, lowercasing
/// usernames in the header per the factory contract. `visname` is NOT
/// auto-filled here; callers that omit it should default it to
/// `orig_user` before constructing the `Packet` (arity property 3).
pub fn encode_packet(packet: &Packet) -> LpcValue {
    let mut fields = Vec::new();
    packet.header.encode_into(&mut fields);

    match &packet.body {
        PacketBody::Tell(b) | PacketBody::Emoteto(b) => {
            fields.push(LpcValue::Str(b.visname.clone()));
            fields.push(LpcValue::Str(b.message.clone()));
        }
        PacketBody::ChannelM(b) | PacketBody::ChannelE(b) => {
            fields.push(LpcValue::Str(b.channel.clone()));
            fields.push(LpcValue::Str(b.visname.clone()));
            fields.push(LpcValue::Str(b.message.clone()));
        }
        PacketBody::ChannelT(b) => {
            fields.push(LpcValue::Str(b.channel.clone()));
            fields.push(nullable_str_to_lpc(b.target_mud.as_deref()));
            fields.push(nullable_str_to_lpc(
                b.target_user.as_deref().map(str::to_lowercase).as_deref(),
            ));
            fields.push(LpcValue::Str(b.message.clone()));
            fields.push(LpcValue::Str(b.message_to_target.clone()));
            fields.push(LpcValue::Str(b.visname.clone()));
            fields.push(LpcValue::Str(b.visname_target.clone()));
        }
        PacketBody::StartupReq3(b) => {
            fields.push(LpcValue::Int(b.password));
            fields.push(LpcValue::Int(b.old_mudlist_id));
            fields.push(LpcValue::Int(b.old_chanlist_id));
            fields.push(LpcValue::Int(b.player_port));
            fields.push(LpcValue::Int(b.imud_tcp_port));
            fields.push(LpcValue::Int(b.imud_udp_port));
            fields.push(LpcValue::Str(b.mudlib.clone()));
            fields.push(LpcValue::Str(b.base_mudlib.clone()));
            fields.push(LpcValue::Str(b.driver.clone()));
            fields.push(LpcValue::Str(b.mud_type.clone()));
            fields.push(LpcValue::Int(b.open_status));
            fields.push(LpcValue::Str(b.admin_email.clone()));
            fields.push(LpcValue::Map(b.services.clone()));
            fields.push(LpcValue::Map(b.other_data.clone()));
        }
        PacketBody::Mudlist(b) => {
            fields.push(LpcValue::Int(b.mudlist_id));
            fields.push(LpcValue::Map(b.info.clone()));
        }
        PacketBody::MudlistDelta(b)
        | PacketBody::MudlistAltered(b)
        | PacketBody::ChanlistDelta(b)
        | PacketBody::ChanlistAltered(b) => {
            fields.push(LpcValue::Int(b.token));
            fields.push(LpcValue::Map(b.delta.clone()));
        }
        PacketBody::Error(b) => {
            fields.push(LpcValue::Str(b.error_code.clone()));
            fields.push(LpcValue::Str(b.error_message.clone()));
            fields.push(match &b.error_packet {
                Some(a) => LpcValue::Array(a.clone()),
                None => LpcValue::Int(0),
            });
        }
        PacketBody::Raw(extra) => fields.extend(extra.iter().cloned()),
    }

    LpcValue::Array(fields)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Field extraction helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn check_arity(kind: &str, got: usize, want: usize) -> Result<()> {
    if got != want {
        return Err(WireError::BadPkt(format!(
            "{kind}: expected {want} fields, got {got}"
        )));
    }
    Ok(())
}

fn str_field<'a>(fields: &'a [LpcValue], idx: usize, name: &str) -> Result<&'a str> {
    fields
        .get(idx)
        .and_then(LpcValue::as_str)
        .ok_or_else(|| WireError::BadPkt(format!("{name}: expected string field")))
}

fn int_field(fields: &[LpcValue], idx: usize, name: &str) -> Result<i64> {
    fields
        .get(idx)
        .and_then(LpcValue::as_int)
        .ok_or_else(|| WireError::BadPkt(format!("{name}: expected integer field")))
}

fn map_field(
    fields: &[LpcValue],
    idx: usize,
    name: &str,
) -> Result<Vec<(LpcValue, LpcValue)>> {
    fields
        .get(idx)
        .and_then(LpcValue::as_map)
        .map(|m| m.to_vec())
        .ok_or_else(|| WireError::BadPkt(format!("{name}: expected mapping field")))
}

fn nullable_str_field(
    fields: &[LpcValue],
    idx: usize,
    name: &str,
) -> Result<Option<String>> {
    fields
        .get(idx)
        .and_then(LpcValue::as_nullable_str)
        .map(|opt| opt.map(str::to_string))
        .ok_or_else(|| WireError::BadPkt(format!("{name}: expected string or 0")))
}

fn nullable_str_to_lpc(v: Option<&str>) -> LpcValue {
    match v {
        Some(s) => LpcValue::Str(s.to_string()),
        None => LpcValue::Int(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(kind: &str) -> PacketHeader {
        PacketHeader {
            kind: kind.into(),
            ttl: 200,
            orig_mud: "ExampleMUD".into(),
            orig_user: Some("Alice".into()),
            target_mud: Some("OtherMUD".into()),
            target_user: None,
        }
    }

    #[test]
    fn tell_has_eight_fields_and_roundtrips() {
        let packet = Packet {
            header: header("tell"),
            body: PacketBody::Tell(TellBody {
                visname: "Alice".into(),
                message: "hi there".into(),
            }),
        };
        let encoded = encode_packet(&packet);
        let fields = encoded.as_array().unwrap();
        assert_eq!(fields.len(), 8);

        let decoded = decode_packet(encoded).unwrap();
        assert_eq!(decoded.header.orig_user.as_deref(), Some("alice"));
        match decoded.body {
            PacketBody::Tell(b) => {
                assert_eq!(b.visname, "Alice");
                assert_eq!(b.message, "hi there");
            }
            other => panic!("expected Tell, got {other:?}"),
        }
    }

    #[test]
    fn emoteto_has_eight_fields() {
        let packet = Packet {
            header: header("emoteto"),
            body: PacketBody::Emoteto(TellBody {
                visname: "Alice".into(),
                message: "waves".into(),
            }),
        };
        assert_eq!(encode_packet(&packet).as_array().unwrap().len(), 8);
    }

    #[test]
    fn channel_m_and_e_have_nine_fields() {
        for kind in ["channel-m", "channel-e"] {
            let body = ChannelMsgBody {
                channel: "chat".into(),
                visname: "Alice".into(),
                message: "hello channel".into(),
            };
            let packet = Packet {
                header: header(kind),
                body: if kind == "channel-m" {
                    PacketBody::ChannelM(body)
                } else {
                    PacketBody::ChannelE(body)
                },
            };
            assert_eq!(encode_packet(&packet).as_array().unwrap().len(), 9);
        }
    }

    #[test]
    fn channel_t_has_thirteen_fields() {
        let packet = Packet {
            header: header("channel-t"),
            body: PacketBody::ChannelT(ChannelTargetedBody {
                channel: "chat".into(),
                target_mud: Some("OtherMUD".into()),
                target_user: Some("Bob".into()),
                message: "to everyone".into(),
                message_to_target: "to Bob specifically".into(),
                visname: "Alice".into(),
                visname_target: "Bob".into(),
            }),
        };
        assert_eq!(encode_packet(&packet).as_array().unwrap().len(), 13);
    }

    #[test]
    fn startup_req_3_has_twenty_fields() {
        let packet = Packet {
            header: header("startup-req-3"),
            body: PacketBody::StartupReq3(StartupReq3Body {
                password: 0,
                old_mudlist_id: 0,
                old_chanlist_id: 0,
                player_port: 4000,
                imud_tcp_port: 4001,
                imud_udp_port: 0,
                mudlib: "LPMud".into(),
                base_mudlib: "LPMud".into(),
                driver: "FluffOS".into(),
                mud_type: "LP".into(),
                open_status: 1,
                admin_email: "admin@example.com".into(),
                services: vec![],
                other_data: vec![],
            }),
        };
        let encoded = encode_packet(&packet);
        assert_eq!(encoded.as_array().unwrap().len(), 20);
        let decoded = decode_packet(encoded).unwrap();
        match decoded.body {
            PacketBody::StartupReq3(b) => assert_eq!(b.player_port, 4000),
            other => panic!("expected StartupReq3, got {other:?}"),
        }
    }

    #[test]
    fn wrong_arity_is_bad_pkt() {
        let raw = LpcValue::Array(vec![
            LpcValue::Str("tell".into()),
            LpcValue::Int(200),
            LpcValue::Str("ExampleMUD".into()),
            LpcValue::Int(0),
            LpcValue::Int(0),
            LpcValue::Int(0),
            LpcValue::Str("only one extra field".into()),
        ]);
        let err = decode_packet(raw).unwrap_err();
        assert!(matches!(err, WireError::BadPkt(_)));
    }

    #[test]
    fn unknown_type_decodes_as_raw() {
        let raw = LpcValue::Array(vec![
            LpcValue::Str("who-req".into()),
            LpcValue::Int(200),
            LpcValue::Str("ExampleMUD".into()),
            LpcValue::Int(0),
            LpcValue::Str("*i4".into()),
            LpcValue::Int(0),
            LpcValue::Str("req-abc123".into()),
        ]);
        let decoded = decode_packet(raw).unwrap();
        match decoded.body {
            PacketBody::Raw(extra) => assert_eq!(extra.len(), 1),
            other => panic!("expected Raw, got {other:?}"),
        }
    }

    #[test]
    fn mudlist_delta_token_roundtrips() {
        let packet = Packet {
            header: PacketHeader {
                kind: "mudlist-delta".into(),
                ttl: 200,
                orig_mud: "*i4".into(),
                orig_user: None,
                target_mud: None,
                target_user: None,
            },
            body: PacketBody::MudlistDelta(ListDeltaBody {
                token: 42,
                delta: vec![(LpcValue::Str("OtherMUD".into()), LpcValue::Int(0))],
            }),
        };
        let decoded = decode_packet(encode_packet(&packet)).unwrap();
        match decoded.body {
            PacketBody::MudlistDelta(b) => assert_eq!(b.token, 42),
            other => panic!("expected MudlistDelta, got {other:?}"),
        }
    }

    #[test]
    fn error_packet_field_of_zero_decodes_to_none() {
        let packet = Packet {
            header: header("error"),
            body: PacketBody::Error(ErrorBody {
                error_code: "bad-proto".into(),
                error_message: "target not found".into(),
                error_packet: None,
            }),
        };
        let decoded = decode_packet(encode_packet(&packet)).unwrap();
        match decoded.body {
            PacketBody::Error(b) => assert!(b.error_packet.is_none()),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
