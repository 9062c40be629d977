use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Services this mud declares in `startup-req-3`, e.g. `{"tell": 1, "channel": 1}`.
pub type ServiceMap = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MudConfig {
    pub name: String,
    #[serde(default = "d_player_port")]
    pub player_port: u16,
    #[serde(default = "d_oob_tcp_port")]
    pub oob_tcp_port: u16,
    #[serde(default)]
    pub services: ServiceMap,
    #[serde(default)]
    pub admin_email: String,
    #[serde(default = "d_mudlib")]
    pub mudlib: String,
    #[serde(default = "d_mudlib")]
    pub base_mudlib: String,
    #[serde(default = "d_driver")]
    pub driver: String,
    #[serde(default = "d_mud_type")]
    pub mud_type: String,
    #[serde(default = "d_open_status")]
    pub open_status: String,
}

impl Default for MudConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            player_port: d_player_port(),
            oob_tcp_port: d_oob_tcp_port(),
            services: ServiceMap::new(),
            admin_email: String::new(),
            mudlib: d_mudlib(),
            base_mudlib: d_mudlib(),
            driver: d_driver(),
            mud_type: d_mud_type(),
            open_status: d_open_status(),
        }
    }
}

fn d_player_port() -> u16 {
    4000
}
fn d_oob_tcp_port() -> u16 {
    4001
}
fn d_mudlib() -> String {
    "unknown".into()
}
fn d_driver() -> String {
    "unknown".into()
}
fn d_mud_type() -> String {
    "LP".into()
}
fn d_open_status() -> String {
    "open".into()
}
