//! Small bounded scrollback per channel, populated as `channel-m`/`channel-e`
//! packets arrive and served back by the `channel_history` API method.
//!
//! Deliberately separate from `i3g-state`'s caches: this is connection-plane
//! convenience state (lossy, capped, never persisted), not the durable
//! mudlist/chanlist/who/finger/locate state that crate owns.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;

const HISTORY_CAPACITY: usize = 50;

#[derive(Default)]
pub struct ChannelHistory {
    buffers: Mutex<HashMap<String, VecDeque<Value>>>,
}

impl ChannelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, channel: &str, entry: Value) {
        let mut buffers = self.buffers.lock();
        let buf = buffers.entry(channel.to_string()).or_default();
        if buf.len() >= HISTORY_CAPACITY {
            buf.pop_front();
        }
        buf.push_back(entry);
    }

    /// Most recent `limit` entries, oldest first.
    pub fn recent(&self, channel: &str, limit: usize) -> Vec<Value> {
        let buffers = self.buffers.lock();
        let Some(buf) = buffers.get(channel) else { return Vec::new() };
        let skip = buf.len().saturating_sub(limit);
        buf.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recent_returns_in_arrival_order() {
        let history = ChannelHistory::new();
        history.push("chat", json!({"n": 1}));
        history.push("chat", json!({"n": 2}));
        let recent = history.recent("chat", 10);
        assert_eq!(recent, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[test]
    fn bounded_to_capacity() {
        let history = ChannelHistory::new();
        for n in 0..(HISTORY_CAPACITY + 10) {
            history.push("chat", json!(n));
        }
        assert_eq!(history.recent("chat", HISTORY_CAPACITY + 10).len(), HISTORY_CAPACITY);
    }

    #[test]
    fn unknown_channel_is_empty() {
        let history = ChannelHistory::new();
        assert!(history.recent("nope", 10).is_empty());
    }
}
