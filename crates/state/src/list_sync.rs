//! Generic mudlist/chanlist synchronization: monotonic token algebra plus a
//! dedup ring for repeated `*-altered` full-resync tokens.
//!
//! `local_id` always converges to the maximum token seen, regardless of
//! arrival order. A delta whose token doesn't exceed `local_id` is still
//! applied for content — its entries are merged in — it just can't lower
//! `local_id`. This makes the final state the same composition whether
//! deltas arrive in token order or not.

use std::collections::{HashMap, VecDeque};

use i3g_wire::LpcValue;
use serde_json::Value;

/// Bound on the altered-token dedup ring.
const ALTERED_RING_CAPACITY: usize = 256;

/// One synchronized list (mudlist or chanlist): a token-versioned map plus
/// the monotonicity/dedup bookkeeping needed to apply deltas safely.
#[derive(Default)]
pub struct ListSync {
    local_id: i64,
    entries: HashMap<String, Value>,
    altered_ring: VecDeque<i64>,
}

impl ListSync {
    pub fn new(local_id: i64) -> Self {
        Self {
            local_id,
            entries: HashMap::new(),
            altered_ring: VecDeque::new(),
        }
    }

    pub fn local_id(&self) -> i64 {
        self.local_id
    }

    pub fn entries(&self) -> &HashMap<String, Value> {
        &self.entries
    }

    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Seed an entry from a persisted snapshot at load time, bypassing the
    /// token algebra (the snapshot's token is already reflected in
    /// `local_id` at construction).
    pub fn restore_entry(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    /// Apply an incremental `*-delta` packet. The entries are always merged
    /// in, even for a token at or below `local_id` — an out-of-order
    /// retransmission still carries content that belongs in the final
    /// state, it just can't move `local_id` backwards. Returns the token
    /// `local_id` advanced to, or the unchanged `local_id` if this token
    /// didn't exceed it.
    pub fn apply_delta(&mut self, token: i64, delta: &[(LpcValue, LpcValue)]) -> Option<i64> {
        self.apply_entries(delta);
        if token > self.local_id {
            self.local_id = token;
        }
        Some(self.local_id)
    }

    /// Apply a full `*-altered` resync packet. Same content-always-applies
    /// rule as `apply_delta`, plus a 256-entry dedup ring so a retransmitted
    /// altered token (the router resending the same full resync) doesn't
    /// get processed twice even if it raced in before `local_id` caught up.
    pub fn apply_altered(&mut self, token: i64, delta: &[(LpcValue, LpcValue)]) -> Option<i64> {
        if self.altered_ring.contains(&token) {
            return None;
        }
        let applied = self.apply_delta(token, delta);
        if self.altered_ring.len() >= ALTERED_RING_CAPACITY {
            self.altered_ring.pop_back();
        }
        self.altered_ring.push_front(token);
        applied
    }

    fn apply_entries(&mut self, delta: &[(LpcValue, LpcValue)]) {
        for (k, v) in delta {
            let Some(raw_key) = k.as_str() else { continue };
            let key = raw_key.to_ascii_lowercase();
            match v {
                // A `0` value means "delete this entry" per the delta contract.
                LpcValue::Int(0) => {
                    self.entries.remove(&key);
                }
                other => {
                    self.entries.insert(key, lpc_to_json(other));
                }
            }
        }
    }
}

/// Convert a decoded LPC mapping value into JSON for storage. Buffers
/// become base64-less byte arrays (rare in mudlist/chanlist payloads);
/// everything else maps structurally.
pub fn lpc_to_json(value: &LpcValue) -> Value {
    match value {
        LpcValue::Null => Value::Null,
        LpcValue::Int(i) => Value::from(*i),
        LpcValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        LpcValue::Str(s) => Value::String(s.clone()),
        LpcValue::Array(a) => Value::Array(a.iter().map(lpc_to_json).collect()),
        LpcValue::Map(m) => {
            let mut obj = serde_json::Map::with_capacity(m.len());
            for (k, v) in m {
                if let Some(key) = k.as_str() {
                    obj.insert(key.to_string(), lpc_to_json(v));
                }
            }
            Value::Object(obj)
        }
        LpcValue::Buffer(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(pairs: &[(&str, i64)]) -> Vec<(LpcValue, LpcValue)> {
        pairs
            .iter()
            .map(|(k, v)| (LpcValue::Str((*k).into()), LpcValue::Int(*v)))
            .collect()
    }

    #[test]
    fn higher_token_applies_and_advances_local_id() {
        let mut list = ListSync::new(0);
        let applied = list.apply_delta(5, &delta(&[("ExampleMUD", 1)]));
        assert_eq!(applied, Some(5));
        assert_eq!(list.local_id(), 5);
        assert!(list.lookup("ExampleMUD").is_some());
    }

    #[test]
    fn stale_token_still_applies_content_but_not_local_id() {
        let mut list = ListSync::new(10);
        let applied = list.apply_delta(3, &delta(&[("ExampleMUD", 1)]));
        assert_eq!(applied, Some(10));
        assert_eq!(list.local_id(), 10);
        assert!(list.lookup("ExampleMUD").is_some());
    }

    #[test]
    fn local_id_is_max_token_regardless_of_arrival_order() {
        let mut list = ListSync::new(0);
        for token in [3, 1, 7, 2, 5] {
            list.apply_delta(token, &delta(&[("M", 1)]));
        }
        assert_eq!(list.local_id(), 7);
    }

    #[test]
    fn out_of_order_deltas_compose_to_the_same_state_as_in_order() {
        let d1 = delta(&[("alpha", 1)]);
        let d2 = delta(&[("beta", 1)]);

        let mut in_order = ListSync::new(0);
        in_order.apply_delta(1, &d1);
        in_order.apply_delta(2, &d2);

        let mut out_of_order = ListSync::new(0);
        out_of_order.apply_delta(2, &d2);
        out_of_order.apply_delta(1, &d1);

        assert_eq!(in_order.local_id(), out_of_order.local_id());
        assert!(out_of_order.lookup("alpha").is_some());
        assert!(out_of_order.lookup("beta").is_some());
        assert_eq!(in_order.entries(), out_of_order.entries());
    }

    #[test]
    fn out_of_order_delete_still_removes_the_entry() {
        let mut list = ListSync::new(0);
        list.apply_delta(1, &delta(&[("alpha", 1)]));
        list.apply_delta(3, &delta(&[("beta", 1)]));
        // Token 2 arrives after token 3 but deletes alpha; its content
        // must still land even though it can't move local_id backwards.
        list.apply_delta(2, &delta(&[("alpha", 0)]));

        assert_eq!(list.local_id(), 3);
        assert!(list.lookup("alpha").is_none());
        assert!(list.lookup("beta").is_some());
    }

    #[test]
    fn zero_value_deletes_entry() {
        let mut list = ListSync::new(0);
        list.apply_delta(1, &delta(&[("ExampleMUD", 1)]));
        assert!(list.lookup("ExampleMUD").is_some());
        list.apply_delta(2, &delta(&[("ExampleMUD", 0)]));
        assert!(list.lookup("ExampleMUD").is_none());
    }

    #[test]
    fn duplicate_altered_token_is_deduped() {
        let mut list = ListSync::new(0);
        let first = list.apply_altered(5, &delta(&[("A", 1)]));
        assert_eq!(first, Some(5));
        list.apply_delta(2, &delta(&[("B", 1)]));
        // The ring rejects the repeated token outright, independent of
        // local_id.
        let second = list.apply_altered(5, &delta(&[("A", 1)]));
        assert_eq!(second, None);
    }

    #[test]
    fn altered_ring_is_bounded() {
        let mut list = ListSync::new(0);
        for token in 1..=300 {
            list.apply_altered(token, &delta(&[("A", 1)]));
        }
        assert!(list.altered_ring.len() <= ALTERED_RING_CAPACITY);
    }
}
