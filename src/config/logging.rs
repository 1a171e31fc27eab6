use serde::Deserialize;

/// Log output settings. `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Emit one JSON object per event instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
    /// Colourise the human-readable format. Ignored for JSON output.
    #[serde(default = "LoggingConfig::default_ansi")]
    pub ansi: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_ansi() -> bool {
        true
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            ansi: Self::default_ansi(),
        }
    }
}
