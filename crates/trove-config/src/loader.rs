//! Environment parsing and validation.
//!
//! # Design
//! - All parsing goes through a lookup closure so tests never touch the
//!   process environment.
//! - Blank values count as unset.
//! - The tracker section is enabled by `TROVE_TRACKER_BASE_URL`; its
//!   credentials are then required.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use trove_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};
use url::Url;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, FleetIntervals, LoggingSettings, TrackerConfig};

const DATABASE_URL: &str = "DATABASE_URL";
const BIND_ADDR: &str = "TROVE_BIND_ADDR";
const STORE_DIR: &str = "TROVE_STORE_DIR";
const STATE_DIR: &str = "TROVE_STATE_DIR";
const UPDATE_INTERVAL: &str = "TROVE_UPDATE_INTERVAL_SECS";
const FULL_UPDATE_INTERVAL: &str = "TROVE_FULL_UPDATE_INTERVAL_SECS";
const QUEUE_POP_INTERVAL: &str = "TROVE_QUEUE_POP_INTERVAL_SECS";
const UPDATE_POOL_SIZE: &str = "TROVE_UPDATE_POOL_SIZE";
const INTERACTIVE_POOL_SIZE: &str = "TROVE_INTERACTIVE_POOL_SIZE";
const LOG_LEVEL: &str = "TROVE_LOG_LEVEL";
const LOG_FORMAT: &str = "TROVE_LOG_FORMAT";
const TRACKER_NAME: &str = "TROVE_TRACKER_NAME";
const TRACKER_BASE_URL: &str = "TROVE_TRACKER_BASE_URL";
const TRACKER_USERNAME: &str = "TROVE_TRACKER_USERNAME";
const TRACKER_PASSWORD: &str = "TROVE_TRACKER_PASSWORD";
const TRACKER_RATE_LIMIT: &str = "TROVE_TRACKER_RATE_LIMIT";
const TRACKER_RATE_WINDOW: &str = "TROVE_TRACKER_RATE_WINDOW_SECS";
const TRACKER_RETRY_LIMIT: &str = "TROVE_TRACKER_RETRY_LIMIT";

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// fails validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let env = Env { lookup: &lookup };
        let database_url = env
            .get(DATABASE_URL)
            .ok_or_else(|| ConfigError::missing("database", DATABASE_URL))?;
        let bind_addr: SocketAddr = env.parse_or("http", BIND_ADDR, || defaults::BIND_ADDR)?;
        let store_dir = env
            .get(STORE_DIR)
            .map_or_else(|| PathBuf::from(defaults::STORE_DIR), PathBuf::from);
        let state_dir = env
            .get(STATE_DIR)
            .map_or_else(|| PathBuf::from(defaults::STATE_DIR), PathBuf::from);

        Ok(Self {
            database_url,
            bind_addr,
            store_dir,
            state_dir,
            fleet: fleet_section(&env)?,
            logging: logging_section(&env)?,
            tracker: tracker_section(&env)?,
        })
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse_or<T: FromStr>(
        &self,
        section: &'static str,
        name: &str,
        fallback: impl FnOnce() -> T,
    ) -> ConfigResult<T> {
        self.get(name).map_or_else(
            || Ok(fallback()),
            |raw| {
                raw.parse().map_err(|_| {
                    ConfigError::invalid(
                        section,
                        name,
                        Some(raw.as_str()),
                        "could not be parsed",
                    )
                })
            },
        )
    }

    fn positive_secs(
        &self,
        section: &'static str,
        name: &str,
        fallback: u64,
    ) -> ConfigResult<Duration> {
        let secs: u64 = self.parse_or(section, name, || fallback)?;
        if secs == 0 {
            return Err(ConfigError::invalid(
                section,
                name,
                Some("0"),
                "must be at least one second",
            ));
        }
        Ok(Duration::from_secs(secs))
    }

    fn positive_count(
        &self,
        section: &'static str,
        name: &str,
        fallback: usize,
    ) -> ConfigResult<usize> {
        let count: usize = self.parse_or(section, name, || fallback)?;
        if count == 0 {
            return Err(ConfigError::invalid(
                section,
                name,
                Some("0"),
                "must be positive",
            ));
        }
        Ok(count)
    }
}

fn fleet_section(env: &Env<'_>) -> ConfigResult<FleetIntervals> {
    Ok(FleetIntervals {
        update_interval: env.positive_secs(
            "fleet",
            UPDATE_INTERVAL,
            defaults::UPDATE_INTERVAL_SECS,
        )?,
        full_update_interval: env.positive_secs(
            "fleet",
            FULL_UPDATE_INTERVAL,
            defaults::FULL_UPDATE_INTERVAL_SECS,
        )?,
        queue_pop_interval: env.positive_secs(
            "fleet",
            QUEUE_POP_INTERVAL,
            defaults::QUEUE_POP_INTERVAL_SECS,
        )?,
        update_pool_size: env.positive_count(
            "fleet",
            UPDATE_POOL_SIZE,
            defaults::UPDATE_POOL_SIZE,
        )?,
        interactive_pool_size: env.positive_count(
            "fleet",
            INTERACTIVE_POOL_SIZE,
            defaults::INTERACTIVE_POOL_SIZE,
        )?,
    })
}

fn logging_section(env: &Env<'_>) -> ConfigResult<LoggingSettings> {
    let format = match env.get(LOG_FORMAT) {
        None => LogFormat::infer(),
        Some(raw) => LogFormat::parse(&raw).ok_or_else(|| {
            ConfigError::invalid(
                "logging",
                LOG_FORMAT,
                Some(raw.as_str()),
                "expected json or pretty",
            )
        })?,
    };
    Ok(LoggingSettings {
        level: env
            .get(LOG_LEVEL)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        format,
    })
}

fn tracker_section(env: &Env<'_>) -> ConfigResult<Option<TrackerConfig>> {
    let Some(raw_url) = env.get(TRACKER_BASE_URL) else {
        return Ok(None);
    };
    let base_url = Url::parse(&raw_url).map_err(|_| {
        ConfigError::invalid(
            "tracker",
            TRACKER_BASE_URL,
            Some(raw_url.as_str()),
            "not a valid url",
        )
    })?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "tracker",
            TRACKER_BASE_URL,
            Some(raw_url.as_str()),
            "scheme must be http or https",
        ));
    }
    let username = env
        .get(TRACKER_USERNAME)
        .ok_or_else(|| ConfigError::missing("tracker", TRACKER_USERNAME))?;
    let password = env
        .get(TRACKER_PASSWORD)
        .ok_or_else(|| ConfigError::missing("tracker", TRACKER_PASSWORD))?;
    let retry_limit: u32 =
        env.parse_or("tracker", TRACKER_RETRY_LIMIT, || defaults::TRACKER_RETRY_LIMIT)?;
    if retry_limit == 0 {
        return Err(ConfigError::invalid(
            "tracker",
            TRACKER_RETRY_LIMIT,
            Some("0"),
            "must be positive",
        ));
    }
    Ok(Some(TrackerConfig {
        name: env
            .get(TRACKER_NAME)
            .unwrap_or_else(|| defaults::TRACKER_NAME.to_string()),
        base_url,
        username,
        password,
        rate_limit: env.positive_count(
            "tracker",
            TRACKER_RATE_LIMIT,
            defaults::TRACKER_RATE_LIMIT,
        )?,
        rate_window: env.positive_secs(
            "tracker",
            TRACKER_RATE_WINDOW,
            defaults::TRACKER_RATE_WINDOW_SECS,
        )?,
        retry_limit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ConfigResult<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() -> ConfigResult<()> {
        let config = load(&[(DATABASE_URL, "postgres://localhost/trove")])?;
        assert_eq!(config.database_url, "postgres://localhost/trove");
        assert_eq!(config.bind_addr, defaults::BIND_ADDR);
        assert_eq!(config.store_dir, PathBuf::from("./data/torrents"));
        assert_eq!(
            config.session_cache_path(),
            PathBuf::from("./data/state").join("tracker-session.json")
        );
        assert_eq!(config.fleet.update_interval, Duration::from_secs(3));
        assert_eq!(config.fleet.full_update_interval, Duration::from_secs(30));
        assert_eq!(config.fleet.queue_pop_interval, Duration::from_secs(30));
        assert_eq!(config.fleet.update_pool_size, 1);
        assert_eq!(config.fleet.interactive_pool_size, 2);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::infer());
        assert!(config.tracker.is_none());
        Ok(())
    }

    #[test]
    fn database_url_is_required() {
        let err = load(&[(BIND_ADDR, "0.0.0.0:8080")]).err();
        assert_eq!(
            err,
            Some(ConfigError::MissingField {
                section: "database",
                field: DATABASE_URL.into(),
            })
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let err = load(&[(DATABASE_URL, "   ")]).err();
        assert!(matches!(err, Some(ConfigError::MissingField { .. })));
    }

    #[test]
    fn overrides_are_parsed() -> ConfigResult<()> {
        let config = load(&[
            (DATABASE_URL, "postgres://db/trove"),
            (BIND_ADDR, "0.0.0.0:8080"),
            (UPDATE_INTERVAL, "5"),
            (UPDATE_POOL_SIZE, "4"),
            (LOG_FORMAT, "json"),
            (LOG_LEVEL, "debug"),
        ])?;
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.fleet.update_interval, Duration::from_secs(5));
        assert_eq!(config.fleet.update_pool_size, 4);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "debug");
        Ok(())
    }

    #[test]
    fn invalid_values_name_the_field() {
        let cases = [
            (BIND_ADDR, "not-an-addr"),
            (UPDATE_INTERVAL, "0"),
            (UPDATE_INTERVAL, "soon"),
            (INTERACTIVE_POOL_SIZE, "0"),
            (LOG_FORMAT, "xml"),
        ];
        for (name, value) in cases {
            let err = load(&[(DATABASE_URL, "postgres://db/trove"), (name, value)]).err();
            match err {
                Some(ConfigError::InvalidField { field, .. }) => assert_eq!(field, name),
                other => panic!("{name}={value} gave {other:?}"),
            }
        }
    }

    #[test]
    fn tracker_section_requires_credentials() -> ConfigResult<()> {
        let err = load(&[
            (DATABASE_URL, "postgres://db/trove"),
            (TRACKER_BASE_URL, "https://tracker.example"),
            (TRACKER_USERNAME, "user"),
        ])
        .err();
        assert_eq!(err.as_ref().map(ConfigError::field), Some(TRACKER_PASSWORD));

        let config = load(&[
            (DATABASE_URL, "postgres://db/trove"),
            (TRACKER_BASE_URL, "https://tracker.example"),
            (TRACKER_USERNAME, "user"),
            (TRACKER_PASSWORD, "secret"),
            (TRACKER_RATE_LIMIT, "3"),
        ])?;
        let tracker = config.tracker.ok_or_else(|| ConfigError::missing("tracker", "test"))?;
        assert_eq!(tracker.name, "what.cd");
        assert_eq!(tracker.rate_limit, 3);
        assert_eq!(tracker.rate_window, Duration::from_secs(10));
        assert_eq!(tracker.retry_limit, 5);
        Ok(())
    }

    #[test]
    fn tracker_url_must_be_http() {
        let err = load(&[
            (DATABASE_URL, "postgres://db/trove"),
            (TRACKER_BASE_URL, "ftp://tracker.example"),
            (TRACKER_USERNAME, "user"),
            (TRACKER_PASSWORD, "secret"),
        ])
        .err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField {
                reason: "scheme must be http or https",
                ..
            })
        ));
    }
}
