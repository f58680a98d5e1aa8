use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for the engine. Deserialized as the `engine` table of the CLI
/// configuration; every field has a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Occurrences returned for one series in one window before the
    /// materializer stops and logs a warning
    pub max_occurrences_per_window: usize,
    /// How far `next_occurrences` previews look ahead
    pub preview_horizon_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_occurrences_per_window: 5000,
            preview_horizon_days: 365,
        }
    }
}

impl EngineConfig {
    pub fn preview_horizon(&self) -> Duration {
        Duration::days(i64::from(self.preview_horizon_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "preview_horizon_days": 30 }"#).unwrap();
        assert_eq!(config.preview_horizon_days, 30);
        assert_eq!(config.max_occurrences_per_window, 5000);
        assert_eq!(config.preview_horizon(), Duration::days(30));
    }
}
