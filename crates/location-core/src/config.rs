// ============================
// location-core/src/config.rs
// ============================
//! Configuration management.
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use headpat_common::TrackingOptions;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "headpat.toml";

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "HEADPAT_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Location sharing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Document store database holding both collections
    pub database_id: String,
    /// Collection of live location records, one per sharing user
    pub locations_collection: String,
    /// Collection of user display data
    pub profiles_collection: String,
    /// Name the background location task is registered under
    pub task_name: String,
    /// Log level
    pub log_level: String,
    /// Options handed to the scheduler on registration
    pub tracking: TrackingOptions,
    /// Realtime endpoint settings
    pub realtime: RealtimeSettings,
}

/// Realtime websocket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// REST endpoint of the backend; the websocket URL is derived from it
    pub endpoint: String,
    pub project_id: String,
    /// Seconds between heartbeat pings
    pub heartbeat_secs: u64,
    pub max_reconnect_attempts: u8,
    /// Base delay before the first reconnect, doubled on every attempt
    pub reconnect_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_id: "hp_db".to_string(),
            locations_collection: "locations".to_string(),
            profiles_collection: "userdata".to_string(),
            task_name: "background-location-task".to_string(),
            log_level: "info".to_string(),
            tracking: TrackingOptions::default(),
            realtime: RealtimeSettings::default(),
        }
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.headpat.place/v1".to_string(),
            project_id: "hp-main".to_string(),
            heartbeat_secs: 20,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from `headpat.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific TOML file, then the environment.
    ///
    /// A missing file is not an error; defaults fill every absent key.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = [
            ("database_id", &self.database_id),
            ("locations_collection", &self.locations_collection),
            ("profiles_collection", &self.profiles_collection),
            ("task_name", &self.task_name),
            ("realtime.project_id", &self.realtime.project_id),
        ];
        for (field, value) in ids {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: format!("unknown level {:?}", self.log_level),
            });
        }

        if !(self.tracking.distance_interval > 0.0) {
            return Err(ConfigError::Invalid {
                field: "tracking.distanceInterval",
                reason: "must be a positive number of meters".to_string(),
            });
        }

        if self.tracking.time_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "tracking.timeInterval",
                reason: "must be at least one millisecond".to_string(),
            });
        }

        if self.realtime.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "realtime.heartbeat_secs",
                reason: "must be at least one second".to_string(),
            });
        }

        if !self.realtime.endpoint.starts_with("http://")
            && !self.realtime.endpoint.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                field: "realtime.endpoint",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        Ok(())
    }

    /// Realtime channel carrying every change to the location collection
    pub fn locations_channel(&self) -> String {
        format!(
            "databases.{}.collections.{}.documents",
            self.database_id, self.locations_collection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tracking.distance_interval, 10.0);
        assert_eq!(settings.tracking.time_interval, 10_000);
        assert_eq!(
            settings.locations_channel(),
            "databases.hp_db.collections.locations.documents"
        );
    }

    #[test]
    fn test_settings_validation() {
        let mut invalid = Settings::default();
        invalid.log_level = "loud".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = Settings::default();
        invalid.locations_collection = "  ".to_string();
        assert!(matches!(
            invalid.validate(),
            Err(ConfigError::Invalid { field: "locations_collection", .. })
        ));

        let mut invalid = Settings::default();
        invalid.tracking.distance_interval = 0.0;
        assert!(invalid.validate().is_err());

        let mut invalid = Settings::default();
        invalid.tracking.time_interval = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = Settings::default();
        invalid.realtime.endpoint = "ftp://example.com".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_settings_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("headpat.toml");

        std::fs::write(
            &config_path,
            r#"
            database_id = "test_db"
            log_level = "debug"

            [tracking]
            accuracy = "high"
            distanceInterval = 25.0
            timeInterval = 5000
            showsBackgroundLocationIndicator = true
            pausesUpdatesAutomatically = false

            [realtime]
            endpoint = "https://appwrite.example.com/v1"
            project_id = "test-project"
            heartbeat_secs = 30
            max_reconnect_attempts = 2
            reconnect_delay_ms = 10
            "#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.database_id, "test_db");
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.locations_collection, "locations");
        assert_eq!(settings.tracking.distance_interval, 25.0);
        assert_eq!(settings.tracking.time_interval, 5000);
        assert!(settings.tracking.shows_indicator);
        assert_eq!(settings.realtime.project_id, "test-project");
    }

    #[test]
    fn test_environment_takes_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                task_name = "from-file"
                log_level = "debug"
                "#,
            )?;
            jail.set_env("HEADPAT_LOG_LEVEL", "warn");
            jail.set_env("HEADPAT_REALTIME__PROJECT_ID", "from-env");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings.task_name, "from-file");
            assert_eq!(settings.log_level, "warn");
            assert_eq!(settings.realtime.project_id, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, r#"database_id = """#)?;
            assert!(Settings::load().is_err());
            Ok(())
        });
    }
}
