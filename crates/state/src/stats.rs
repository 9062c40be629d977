//! Lock-free gateway counters, exposed via the `stats` JSON-RPC method.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Stats {
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    reconnects: AtomicU64,
    mudlist_deltas_applied: AtomicU64,
    chanlist_deltas_applied: AtomicU64,
    rpc_requests: AtomicU64,
    rpc_errors: AtomicU64,
    events_dropped: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub reconnects: u64,
    pub mudlist_deltas_applied: u64,
    pub chanlist_deltas_applied: u64,
    pub rpc_requests: u64,
    pub rpc_errors: u64,
    pub events_dropped: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_mudlist_delta(&self) {
        self.mudlist_deltas_applied.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_chanlist_delta(&self) {
        self.chanlist_deltas_applied.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_rpc_request(&self) {
        self.rpc_requests.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_events_dropped(&self, count: u64) {
        self.events_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            mudlist_deltas_applied: self.mudlist_deltas_applied.load(Ordering::Relaxed),
            chanlist_deltas_applied: self.chanlist_deltas_applied.load(Ordering::Relaxed),
            rpc_requests: self.rpc_requests.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 0);
        assert_eq!(snap.rpc_errors, 0);
    }

    #[test]
    fn record_increments_the_right_counter() {
        let stats = Stats::new();
        stats.record_packet_received();
        stats.record_packet_received();
        stats.record_rpc_error();
        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.rpc_errors, 1);
        assert_eq!(snap.packets_sent, 0);
    }
}
