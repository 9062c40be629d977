//! `GatewayState` — the single owner of all durable and semi-durable
//! gateway state: router passwords, mudlist/chanlist sync, response
//! caches, and counters. One task serializes all mutation; reads are
//! lock-free where practical (the sub-stores use `parking_lot::RwLock`
//! internally and are cheap to read-lock from any task).

use std::path::PathBuf;
use std::time::Duration;

use i3g_domain::config::StateConfig;
use i3g_router_link::LinkState;
use i3g_wire::LpcValue;
use parking_lot::RwLock;
use serde_json::Value;

use crate::cache::{TtlCache, UserCache};
use crate::list_sync::ListSync;
use crate::persist::PersistedState;
use crate::stats::{Stats, StatsSnapshot};

const WHO_TTL: Duration = Duration::from_secs(30);
const FINGER_TTL: Duration = Duration::from_secs(300);
const LOCATE_TTL: Duration = Duration::from_secs(60);

pub struct GatewayState {
    persist_path: PathBuf,
    router_passwords: RwLock<std::collections::HashMap<String, i64>>,
    mudlist: RwLock<ListSync>,
    chanlist: RwLock<ListSync>,
    who_cache: RwLock<TtlCache>,
    finger_cache: RwLock<TtlCache>,
    locate_cache: RwLock<TtlCache>,
    user_cache: RwLock<UserCache>,
    pub stats: Stats,
}

impl GatewayState {
    /// Load persisted state (or cold-start defaults) from `cfg.persist_path`.
    pub fn load(cfg: &StateConfig) -> Self {
        let path = crate::persist::persist_path(&cfg.persist_path);
        let persisted = PersistedState::load(&path);

        let mut mudlist = ListSync::new(persisted.mudlist_id);
        for (name, info) in persisted.last_mudlist {
            mudlist.restore_entry(name, info);
        }
        let mut chanlist = ListSync::new(persisted.chanlist_id);
        for (name, info) in persisted.last_chanlist {
            chanlist.restore_entry(name, info);
        }

        Self {
            persist_path: path,
            router_passwords: RwLock::new(persisted.router_passwords),
            mudlist: RwLock::new(mudlist),
            chanlist: RwLock::new(chanlist),
            who_cache: RwLock::new(TtlCache::new(WHO_TTL)),
            finger_cache: RwLock::new(TtlCache::new(FINGER_TTL)),
            locate_cache: RwLock::new(TtlCache::new(LOCATE_TTL)),
            user_cache: RwLock::new(UserCache::new()),
            stats: Stats::new(),
        }
    }

    // ── Mudlist / chanlist ───────────────────────────────────────────

    pub fn apply_mudlist_delta(&self, token: i64, delta: &[(LpcValue, LpcValue)]) -> Option<i64> {
        let applied = self.mudlist.write().apply_delta(token, delta);
        if applied.is_some() {
            self.stats.record_mudlist_delta();
        }
        applied
    }

    pub fn apply_mudlist_altered(&self, token: i64, delta: &[(LpcValue, LpcValue)]) -> Option<i64> {
        let applied = self.mudlist.write().apply_altered(token, delta);
        if applied.is_some() {
            self.stats.record_mudlist_delta();
        }
        applied
    }

    pub fn apply_chanlist_delta(&self, token: i64, delta: &[(LpcValue, LpcValue)]) -> Option<i64> {
        let applied = self.chanlist.write().apply_delta(token, delta);
        if applied.is_some() {
            self.stats.record_chanlist_delta();
        }
        applied
    }

    pub fn apply_chanlist_altered(&self, token: i64, delta: &[(LpcValue, LpcValue)]) -> Option<i64> {
        let applied = self.chanlist.write().apply_altered(token, delta);
        if applied.is_some() {
            self.stats.record_chanlist_delta();
        }
        applied
    }

    pub fn get_mudlist(&self) -> std::collections::HashMap<String, Value> {
        self.mudlist.read().entries().clone()
    }

    pub fn get_channels(&self) -> std::collections::HashMap<String, Value> {
        self.chanlist.read().entries().clone()
    }

    pub fn lookup_mud(&self, name: &str) -> Option<Value> {
        self.mudlist.read().lookup(&name.to_ascii_lowercase()).cloned()
    }

    // ── Response caches ──────────────────────────────────────────────

    pub fn cache_who(&self, key: &str, value: Value) {
        self.who_cache.write().insert(key.to_string(), value);
    }
    pub fn cached_who(&self, key: &str) -> Option<Value> {
        self.who_cache.read().get(key)
    }

    pub fn cache_finger(&self, key: &str, value: Value) {
        self.finger_cache.write().insert(key.to_string(), value);
    }
    pub fn cached_finger(&self, key: &str) -> Option<Value> {
        self.finger_cache.read().get(key)
    }

    pub fn cache_locate(&self, key: &str, value: Value) {
        self.locate_cache.write().insert(key.to_string(), value);
    }
    pub fn cached_locate(&self, key: &str) -> Option<Value> {
        self.locate_cache.read().get(key)
    }

    pub fn update_user_cache(&self, mud: &str, user: &str, info: Value) {
        self.user_cache.write().update(mud, user, info);
    }
    pub fn user_cache_len(&self) -> usize {
        self.user_cache.read().len()
    }

    /// Sweep expired entries from all TTL caches. Returns the total
    /// removed, for the janitor task's log line.
    pub fn sweep_caches(&self) -> usize {
        self.who_cache.write().sweep_expired()
            + self.finger_cache.write().sweep_expired()
            + self.locate_cache.write().sweep_expired()
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Snapshot current state to disk. Called periodically and on clean
    /// shutdown.
    pub fn flush(&self) -> i3g_domain::error::Result<()> {
        let snapshot = PersistedState {
            router_passwords: self.router_passwords.read().clone(),
            mudlist_id: self.mudlist.read().local_id(),
            chanlist_id: self.chanlist.read().local_id(),
            last_mudlist: self.mudlist.read().entries().clone(),
            last_chanlist: self.chanlist.read().entries().clone(),
        };
        snapshot.save(&self.persist_path)?;
        i3g_domain::trace::TraceEvent::StateSnapshotWritten {
            path: self.persist_path.display().to_string(),
        }
        .emit();
        Ok(())
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl LinkState for GatewayState {
    fn router_password(&self, router_name: &str) -> i64 {
        self.router_passwords
            .read()
            .get(router_name)
            .copied()
            .unwrap_or(0)
    }

    fn set_router_password(&self, router_name: &str, password: i64) {
        self.router_passwords
            .write()
            .insert(router_name.to_string(), password);
    }

    fn last_mudlist_id(&self) -> i64 {
        self.mudlist.read().local_id()
    }

    fn last_chanlist_id(&self) -> i64 {
        self.chanlist.read().local_id()
    }
}
