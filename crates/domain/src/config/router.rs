use serde::{Deserialize, Serialize};

/// One router endpoint the connection manager may dial, in preferred order.
///
/// Router names are conventionally prefixed with `*` (e.g. `*i4`); the
/// prefix is not enforced here, only carried through as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "d_endpoints")]
    pub endpoints: Vec<RouterEndpoint>,
    #[serde(default = "d_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "d_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            endpoints: d_endpoints(),
            handshake_timeout_secs: d_handshake_timeout(),
            idle_timeout_secs: d_idle_timeout(),
        }
    }
}

fn d_endpoints() -> Vec<RouterEndpoint> {
    Vec::new()
}

fn d_handshake_timeout() -> u64 {
    30
}

fn d_idle_timeout() -> u64 {
    300
}
