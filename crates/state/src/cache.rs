//! TTL-bounded response caches (`who`, `finger`, `locate`) and the
//! unbounded user cache fed by `ucache-update` packets.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

/// A cache of values keyed by string, each expiring `ttl` after insertion.
/// Used for `who`/`finger`/`locate` request/reply caching, where a
/// correlation key (`mud:arg`) maps to the last reply seen.
pub struct TtlCache {
    ttl: Duration,
    entries: HashMap<String, (Instant, Value)>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).and_then(|(inserted, value)| {
            if inserted.elapsed() < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Drop every expired entry. Returns how many were removed; the
    /// gateway's janitor task calls this periodically and logs the count.
    pub fn sweep_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Unbounded per-mud user cache populated by `ucache-update` packets.
/// There's no TTL here — entries are only ever replaced, never expired —
/// matching the router's own "best known info" semantics for this data.
#[derive(Default)]
pub struct UserCache {
    entries: HashMap<String, Value>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mud: &str, user: &str) -> Option<&Value> {
        self.entries.get(&user_key(mud, user))
    }

    pub fn update(&mut self, mud: &str, user: &str, info: Value) {
        self.entries.insert(user_key(mud, user), info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn user_key(mud: &str, user: &str) -> String {
    format!("{}:{}", mud.to_ascii_lowercase(), user.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_retrievable() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("OtherMUD:bob".into(), serde_json::json!({"idle": 0}));
        assert!(cache.get("OtherMUD:bob").is_some());
    }

    #[test]
    fn expired_entry_is_not_retrievable() {
        let mut cache = TtlCache::new(Duration::from_millis(1));
        cache.insert("OtherMUD:bob".into(), serde_json::json!({"idle": 0}));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("OtherMUD:bob").is_none());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mut cache = TtlCache::new(Duration::from_millis(5));
        cache.insert("a".into(), serde_json::json!(1));
        std::thread::sleep(Duration::from_millis(10));
        cache.insert("b".into(), serde_json::json!(2));
        let removed = cache.sweep_expired();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn user_cache_lookup_is_case_insensitive() {
        let mut cache = UserCache::new();
        cache.update("OtherMUD", "Bob", serde_json::json!({"idle": 3}));
        assert!(cache.get("othermud", "bob").is_some());
    }
}
