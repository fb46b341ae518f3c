use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Level of the crate's own targets; dependencies log at info
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Extra filter directives, e.g. `likebridge::processor=trace`
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Filter string for the subscriber. `level_override` replaces the
    /// configured crate level.
    pub fn filter(&self, level_override: Option<&str>) -> String {
        let level = level_override.unwrap_or(&self.level);
        std::iter::once(format!("likebridge={},info", level))
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Coloured single-line output for terminals
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}
