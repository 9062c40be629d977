//! On-disk snapshot of durable gateway state: router passwords, mudlist/
//! chanlist sync tokens, and the last known mudlist/chanlist contents.
//!
//! Loaded once at startup, written on a periodic janitor tick and again on
//! clean shutdown. An absent or unreadable file is cold-start defaults,
//! never a fatal error — a fresh gateway has never talked to a router yet.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use i3g_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistedState {
    #[serde(default)]
    pub router_passwords: HashMap<String, i64>,
    #[serde(default)]
    pub mudlist_id: i64,
    #[serde(default)]
    pub chanlist_id: i64,
    #[serde(default)]
    pub last_mudlist: HashMap<String, Value>,
    #[serde(default)]
    pub last_chanlist: HashMap<String, Value>,
}

impl PersistedState {
    /// Load from `path`. Cold-start defaults (all zero/empty) on a missing
    /// file or a file that fails to parse — a corrupt snapshot shouldn't
    /// block startup, it just costs a resync.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "persisted state unreadable, cold-starting");
                Self::default()
            }),
            Err(_) => {
                tracing::info!(path = %path.display(), "no persisted state found, cold-starting");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::Io)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }
}

/// Resolve the configured persist path to an absolute-ish `PathBuf`, kept
/// as its own function so tests can point it at a temp directory.
pub fn persist_path(configured: &str) -> PathBuf {
    PathBuf::from(configured)
}
