use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub ws: WsTransportConfig,
    #[serde(default)]
    pub tcp: TcpTransportConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            ws: WsTransportConfig::default(),
            tcp: TcpTransportConfig::default(),
            auth: AuthConfig::default(),
            rate_limits: RateLimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsTransportConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_ws_port")]
    pub port: u16,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: d_host(),
            port: d_ws_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_tcp_port")]
    pub port: u16,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: d_host(),
            port: d_tcp_port(),
        }
    }
}

/// One pre-shared API key and the permissions it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub mud_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    #[serde(default = "d_session_timeout")]
    pub session_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            session_timeout_secs: d_session_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "d_per_minute")]
    pub per_minute: u32,
    #[serde(default = "d_per_hour")]
    pub per_hour: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            per_minute: d_per_minute(),
            per_hour: d_per_hour(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_ws_port() -> u16 {
    8787
}
fn d_tcp_port() -> u16 {
    8788
}
fn d_session_timeout() -> u64 {
    3600
}
fn d_per_minute() -> u32 {
    60
}
fn d_per_hour() -> u32 {
    2000
}
