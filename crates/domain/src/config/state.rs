use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "d_persist_path")]
    pub persist_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist_path: d_persist_path(),
        }
    }
}

fn d_persist_path() -> String {
    "i3gated-state.json".into()
}
