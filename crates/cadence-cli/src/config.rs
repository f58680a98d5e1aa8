use cadence_core::config::EngineConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timezone::detect_system_timezone;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: String,
    /// Tenant every command operates on
    pub company_id: Uuid,
    /// Timezone for new series and for reading dates without an offset
    pub default_timezone: String,
    /// Length of the default `show`/`agenda` window
    pub agenda_days: u32,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "cadence.db".to_string(),
            company_id: Uuid::nil(),
            default_timezone: detect_system_timezone(),
            agenda_days: 14,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then `cadence.toml`, then `CADENCE_*` environment variables
    /// (`CADENCE_ENGINE__PREVIEW_HORIZON_DAYS` for nested keys).
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment(Toml::file("cadence.toml")).extract()
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("CADENCE_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_env_layers() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cadence.toml",
                r#"
                agenda_days = 7
                default_timezone = "Europe/Berlin"

                [engine]
                max_occurrences_per_window = 100
                "#,
            )?;
            jail.set_env("CADENCE_DATABASE_PATH", "/tmp/other.db");
            jail.set_env("CADENCE_ENGINE__PREVIEW_HORIZON_DAYS", "30");

            let config: Config = Config::figment(Toml::file("cadence.toml")).extract()?;
            assert_eq!(config.agenda_days, 7);
            assert_eq!(config.default_timezone, "Europe/Berlin");
            assert_eq!(config.database_path, "/tmp/other.db");
            assert_eq!(config.engine.max_occurrences_per_window, 100);
            assert_eq!(config.engine.preview_horizon_days, 30);
            assert_eq!(config.company_id, Uuid::nil());
            Ok(())
        });
    }
}
