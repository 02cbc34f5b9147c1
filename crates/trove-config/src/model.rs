//! Typed configuration sections.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use trove_telemetry::LogFormat;
use url::Url;

use crate::defaults::SESSION_CACHE_FILE;

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Address the HTTP surface listens on.
    pub bind_addr: SocketAddr,
    /// Root of the content-addressed torrent store.
    pub store_dir: PathBuf,
    /// Directory for small state files such as the tracker session cache.
    pub state_dir: PathBuf,
    /// Loop periods and semaphore sizes.
    pub fleet: FleetIntervals,
    /// Subscriber settings.
    pub logging: LoggingSettings,
    /// External tracker, when configured.
    pub tracker: Option<TrackerConfig>,
}

impl AppConfig {
    /// Location of the persisted tracker session.
    #[must_use]
    pub fn session_cache_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_CACHE_FILE)
    }
}

/// Loop periods and concurrency limits for the fleet manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetIntervals {
    /// Partial (incomplete-only) sync period per worker.
    pub update_interval: Duration,
    /// Full sync period.
    pub full_update_interval: Duration,
    /// Admission queue drain period.
    pub queue_pop_interval: Duration,
    /// Concurrent full syncs.
    pub update_pool_size: usize,
    /// Concurrent interactive operations (add, delete, partial sync).
    pub interactive_pool_size: usize,
}

/// Log level and output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Connection settings for the external tracker metadata API.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Name used to address the tracker in requests.
    pub name: String,
    /// Site root.
    pub base_url: Url,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Requests allowed per window.
    pub rate_limit: usize,
    /// Sliding window length.
    pub rate_window: Duration,
    /// Attempts made by retrying calls.
    pub retry_limit: u32,
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("rate_limit", &self.rate_limit)
            .field("rate_window", &self.rate_window)
            .field("retry_limit", &self.retry_limit)
            .finish()
    }
}
