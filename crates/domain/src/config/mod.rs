mod api;
mod logging;
mod mud;
mod router;
mod state;

pub use api::*;
pub use logging::*;
pub use mud::*;
pub use router::*;
pub use state::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub mud: MudConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub state: StateConfig,
    /// Ambient — not part of the wire-protocol recognized options.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Callers should
    /// refuse to serve when any `ConfigSeverity::Error` issue is present.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // ── router ──────────────────────────────────────────────────
        if self.router.endpoints.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "router.endpoints".into(),
                message: "no router endpoints configured — the gateway cannot connect".into(),
            });
        }
        let mut seen_routers: HashSet<&str> = HashSet::new();
        for (i, ep) in self.router.endpoints.iter().enumerate() {
            if ep.name.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.endpoints[{i}].name"),
                    message: "router name must not be empty".into(),
                });
            }
            if ep.host.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.endpoints[{i}].host"),
                    message: "router host must not be empty".into(),
                });
            }
            if ep.port == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.endpoints[{i}].port"),
                    message: "router port must be greater than 0".into(),
                });
            }
            if !ep.name.is_empty() && !seen_routers.insert(&ep.name) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("router.endpoints[{i}].name"),
                    message: format!("duplicate router name \"{}\"", ep.name),
                });
            }
        }
        if self.router.handshake_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "router.handshake_timeout_secs".into(),
                message: "handshake_timeout_secs must be greater than 0".into(),
            });
        }
        if self.router.idle_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "router.idle_timeout_secs".into(),
                message: "idle_timeout_secs must be greater than 0".into(),
            });
        }

        // ── mud ─────────────────────────────────────────────────────
        if self.mud.name.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "mud.name".into(),
                message: "mud.name must not be empty".into(),
            });
        }
        if self.mud.player_port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "mud.player_port".into(),
                message: "player_port must be greater than 0".into(),
            });
        }

        // ── api transports ─────────────────────────────────────────
        if !self.api.ws.enabled && !self.api.tcp.enabled {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "api".into(),
                message: "neither ws nor tcp transport is enabled — no API clients can connect"
                    .into(),
            });
        }
        if self.api.ws.enabled && self.api.ws.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api.ws.port".into(),
                message: "port must be greater than 0 when ws is enabled".into(),
            });
        }
        if self.api.tcp.enabled && self.api.tcp.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api.tcp.port".into(),
                message: "port must be greater than 0 when tcp is enabled".into(),
            });
        }
        if self.api.ws.enabled
            && self.api.tcp.enabled
            && self.api.ws.host == self.api.tcp.host
            && self.api.ws.port == self.api.tcp.port
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api".into(),
                message: "ws and tcp transports cannot share the same host:port".into(),
            });
        }

        // ── api auth ─────────────────────────────────────────────────
        if self.api.auth.api_keys.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "api.auth.api_keys".into(),
                message: "no API keys configured — no session will ever authenticate".into(),
            });
        }
        let mut seen_keys: HashSet<&str> = HashSet::new();
        for (i, k) in self.api.auth.api_keys.iter().enumerate() {
            if k.key.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("api.auth.api_keys[{i}].key"),
                    message: "key must not be empty".into(),
                });
            }
            if k.mud_name.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("api.auth.api_keys[{i}].mud_name"),
                    message: "mud_name must not be empty".into(),
                });
            }
            if !k.key.is_empty() && !seen_keys.insert(&k.key) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("api.auth.api_keys[{i}].key"),
                    message: "duplicate API key".into(),
                });
            }
        }
        if self.api.auth.session_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api.auth.session_timeout_secs".into(),
                message: "session_timeout_secs must be greater than 0".into(),
            });
        }

        // ── rate limits ────────────────────────────────────────────
        if self.api.rate_limits.per_minute == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api.rate_limits.per_minute".into(),
                message: "per_minute must be greater than 0".into(),
            });
        }
        if self.api.rate_limits.per_hour == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api.rate_limits.per_hour".into(),
                message: "per_hour must be greater than 0".into(),
            });
        }

        // ── state ──────────────────────────────────────────────────
        if self.state.persist_path.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "state.persist_path".into(),
                message: "persist_path must not be empty".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
