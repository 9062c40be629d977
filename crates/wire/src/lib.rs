//! LPC binary codec, MUD-mode framing, and the I3 packet model + factory.
//!
//! This crate is the wire layer only: it has no notion of a socket, a
//! router, or a session — see `i3g-router-link` for the connection
//! manager and session engine built on top of it.

pub mod error;
pub mod frame;
pub mod packet;
pub mod value;

pub use error::{Result, WireError};
pub use frame::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES};
pub use packet::{
    decode_packet, encode_packet, ChannelMsgBody, ChannelTargetedBody, ErrorBody, ListDeltaBody,
    MudlistBody, Packet, PacketBody, PacketHeader, StartupReq3Body, TellBody,
};
pub use value::LpcValue;
