//! API session table: pre-shared-key authentication, per-session
//! permissions, and restore-by-`session_id` within the configured
//! timeout.
//!
//! Grounded on the shape of a bearer-token check (constant-time compare
//! against configured secrets) generalized from one global token to many
//! keyed sessions, each carrying its own permission set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use i3g_domain::config::AuthConfig;
use i3g_domain::trace::TraceEvent;
use parking_lot::RwLock;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// One authenticated API client. `last_seen` gates both the restore
/// window and the idle-timeout janitor sweep.
pub struct ApiSession {
    pub session_id: String,
    pub mud_name: String,
    pub permissions: Vec<String>,
    last_seen: RwLock<Instant>,
}

impl ApiSession {
    pub fn touch(&self) {
        *self.last_seen.write() = Instant::now();
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_seen.read().elapsed() > timeout
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == "*" || p == permission)
    }
}

/// Authenticated sessions, keyed by `session_id`. One instance per
/// gateway; reads and writes go through its internal lock so no caller
/// needs its own synchronization.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<ApiSession>>>,
    api_keys: Vec<(Vec<u8>, String, Vec<String>)>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(auth: &AuthConfig) -> Self {
        let api_keys = auth
            .api_keys
            .iter()
            .map(|k| (k.key.as_bytes().to_vec(), k.mud_name.clone(), k.permissions.clone()))
            .collect();
        Self {
            sessions: RwLock::new(HashMap::new()),
            api_keys,
            timeout: Duration::from_secs(auth.session_timeout_secs.max(1)),
        }
    }

    /// Authenticate a fresh `api_key`, minting a new session on success.
    /// Keys are compared in constant time so a timing side-channel can't
    /// narrow down a valid prefix.
    pub fn authenticate(&self, api_key: &str) -> Option<Arc<ApiSession>> {
        let presented = api_key.as_bytes();
        let matched = self
            .api_keys
            .iter()
            .find(|(key, _, _)| key.len() == presented.len() && bool::from(key.as_slice().ct_eq(presented)));
        let (_, mud_name, permissions) = matched?;

        let session = Arc::new(ApiSession {
            session_id: Uuid::new_v4().to_string(),
            mud_name: mud_name.clone(),
            permissions: permissions.clone(),
            last_seen: RwLock::new(Instant::now()),
        });
        self.sessions.write().insert(session.session_id.clone(), session.clone());
        TraceEvent::ApiSessionAuthenticated {
            session_id: session.session_id.clone(),
            mud_name: session.mud_name.clone(),
        }
        .emit();
        Some(session)
    }

    /// Restore a session by its prior `session_id`. Returns `None` if it
    /// was never issued or has timed out — the caller treats both the
    /// same way (re-authenticate).
    pub fn restore(&self, session_id: &str) -> Option<Arc<ApiSession>> {
        let session = self.sessions.read().get(session_id).cloned()?;
        if session.is_expired(self.timeout) {
            self.sessions.write().remove(session_id);
            TraceEvent::ApiSessionExpired { session_id: session_id.to_string() }.emit();
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Drop every session idle longer than the configured timeout.
    /// Returns the number removed, for the janitor's log line.
    pub fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(self.timeout))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            TraceEvent::ApiSessionExpired { session_id: id.clone() }.emit();
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
