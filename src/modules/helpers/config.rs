use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use log::LevelFilter;

use crate::errors::{ConfigSnafu, CustomResult};
use crate::modules::helpers::logging::parse_level;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_LOG_FILE: &str = "program.log";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ws_url: String,
    pub database_url: Option<String>,
    pub poll_interval: Duration,
    pub logging_level: LevelFilter,
    pub log_file: String,
}

impl Settings {
    /// # load settings from the environment
    /// a `.env` file is read first when there is one
    pub fn from_env() -> CustomResult<Settings> {
        dotenv().ok();

        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// # load settings from any key value source
    ///
    /// ## Arguments
    /// * `lookup` - returns the value of a key, or none when it is not set
    ///
    /// ## Returns
    /// * `Settings` - the parsed settings
    pub fn from_lookup<F>(lookup: F) -> CustomResult<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ws_url = match lookup("TELEMETRY_WS_URL") {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => {
                return ConfigSnafu {
                    key: "TELEMETRY_WS_URL",
                    message: "must be set",
                }
                .fail()
            }
        };
        // the websocket client is built without tls
        if ws_url.starts_with("wss://") {
            return ConfigSnafu {
                key: "TELEMETRY_WS_URL",
                message: format!("wss:// is not supported, use a plain ws:// url instead of {ws_url}"),
            }
            .fail();
        }
        if !ws_url.starts_with("ws://") {
            return ConfigSnafu {
                key: "TELEMETRY_WS_URL",
                message: format!("expected a ws:// url, got {ws_url}"),
            }
            .fail();
        }

        let poll_interval_ms = match lookup("POLL_INTERVAL_MS") {
            None => DEFAULT_POLL_INTERVAL_MS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return ConfigSnafu {
                        key: "POLL_INTERVAL_MS",
                        message: format!("expected a positive number of milliseconds, got {raw}"),
                    }
                    .fail()
                }
            },
        };

        Ok(Settings {
            ws_url,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            logging_level: lookup("LOGGING_LEVEL")
                .map(|level| parse_level(&level))
                .unwrap_or(LevelFilter::Info),
            log_file: lookup("LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        })
    }

    /// the database url, required by everything except dry runs
    pub fn require_database_url(&self) -> CustomResult<&str> {
        match self.database_url.as_deref() {
            Some(url) => Ok(url),
            None => ConfigSnafu {
                key: "DATABASE_URL",
                message: "must be set",
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> CustomResult<Settings> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn defaults_are_applied() {
        let settings = settings_from(&[("TELEMETRY_WS_URL", "ws://localhost:3010/ws")]).unwrap();

        assert_eq!(settings.poll_interval, Duration::from_millis(5000));
        assert_eq!(settings.logging_level, LevelFilter::Info);
        assert_eq!(settings.log_file, "program.log");
        assert!(settings.require_database_url().is_err());
    }

    #[test]
    fn all_keys_are_read() {
        let settings = settings_from(&[
            ("TELEMETRY_WS_URL", "ws://timing.example/ws"),
            ("DATABASE_URL", "postgres://laps@localhost/laps"),
            ("POLL_INTERVAL_MS", "250"),
            ("LOGGING_LEVEL", "DEBUG"),
            ("LOG_FILE", "ingest.log"),
        ])
        .unwrap();

        assert_eq!(settings.ws_url, "ws://timing.example/ws");
        assert_eq!(settings.require_database_url().unwrap(), "postgres://laps@localhost/laps");
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.logging_level, LevelFilter::Debug);
        assert_eq!(settings.log_file, "ingest.log");
    }

    #[test]
    fn missing_url_is_rejected() {
        let error = settings_from(&[]).unwrap_err();

        assert_eq!(error.kind(), "ConfigError");
        assert!(error.to_string().contains("TELEMETRY_WS_URL"));
    }

    #[test]
    fn tls_urls_are_rejected_at_startup() {
        let error = settings_from(&[("TELEMETRY_WS_URL", "wss://timing.example/ws")]).unwrap_err();

        assert_eq!(error.kind(), "ConfigError");
        assert!(error.to_string().contains("wss://"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(settings_from(&[("TELEMETRY_WS_URL", "http://localhost:3010")]).is_err());
        assert!(settings_from(&[("TELEMETRY_WS_URL", "ws://localhost:3010/ws"), ("POLL_INTERVAL_MS", "0")]).is_err());
        assert!(settings_from(&[("TELEMETRY_WS_URL", "ws://localhost:3010/ws"), ("POLL_INTERVAL_MS", "soon")]).is_err());
    }
}
