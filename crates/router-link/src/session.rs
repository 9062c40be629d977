//! Shared types that cross the boundary between the connection manager and
//! whatever owns durable router state (`i3g-state`, normally).

use i3g_wire::Packet;

/// What the connection manager needs from persisted state to perform a
/// handshake, and how it reports back what it learned.
///
/// `i3g-state` implements this over its own `RwLock`-guarded store; tests
/// here use a trivial in-memory stand-in.
pub trait LinkState: Send + Sync {
    /// Last password this router issued us, or `0` on cold start.
    fn router_password(&self, router_name: &str) -> i64;
    /// Record the password returned in `startup-reply`.
    fn set_router_password(&self, router_name: &str, password: i64);
    /// `old_mudlist_id` to offer in the next handshake.
    fn last_mudlist_id(&self) -> i64;
    /// `old_chanlist_id` to offer in the next handshake.
    fn last_chanlist_id(&self) -> i64;
}

/// Events the connection manager reports to its owner as the link's state
/// changes. Mudlist/chanlist deltas are forwarded as plain packets —
/// applying them (and deduplicating altered tokens) is `i3g-state`'s job,
/// not the link's.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Connecting {
        router_name: String,
    },
    HandshakeCompleted {
        router_name: String,
        mudlist_id: i64,
        chanlist_id: i64,
    },
    PacketReceived(Packet),
    Disconnected {
        router_name: String,
        reason: String,
    },
    Failover {
        from: String,
        to: String,
    },
}
