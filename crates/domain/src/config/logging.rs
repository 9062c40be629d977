use serde::{Deserialize, Serialize};

/// Ambient logging config — not part of the recognized protocol config
/// options, but every deployment needs a way to pick a filter and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"i3g_gateway=info,warn"`.
    #[serde(default = "d_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: d_filter(),
            json: false,
        }
    }
}

fn d_filter() -> String {
    "info".into()
}
