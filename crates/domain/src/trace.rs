use serde::Serialize;

/// Structured trace events emitted across the gateway crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RouterConnecting {
        router: String,
        host: String,
        port: u16,
        attempt: u32,
    },
    RouterConnected {
        router: String,
    },
    RouterDisconnected {
        router: String,
        reason: String,
    },
    HandshakeCompleted {
        router: String,
        mudlist_id: i64,
        chanlist_id: i64,
    },
    MudlistDeltaApplied {
        old_id: i64,
        new_id: i64,
        entries: usize,
    },
    ChanlistDeltaApplied {
        old_id: i64,
        new_id: i64,
        entries: usize,
    },
    RouterFailover {
        from: String,
        to: String,
        consecutive_failures: u32,
    },
    ApiSessionAuthenticated {
        session_id: String,
        mud_name: String,
    },
    ApiSessionExpired {
        session_id: String,
    },
    RateLimited {
        session_id: String,
        method: String,
    },
    AuthTokenIssued {
        peer_mud: String,
    },
    AuthTokenConsumed {
        peer_mud: String,
    },
    AuthTokenRejected {
        peer_mud: String,
        reason: String,
    },
    SlowConsumer {
        session_id: String,
        events_dropped: usize,
    },
    StateSnapshotWritten {
        path: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "i3g_event");
    }
}
