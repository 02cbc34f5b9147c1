//! Global subscriber setup for the fleet service.
//!
//! # Design
//! - `RUST_LOG` wins over the configured level when it is set.
//! - Exactly one of the JSON and text layers is active; the other is `None`.
//! - The build SHA is fixed by the first successful call.

use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Level directive used when neither `RUST_LOG` nor configuration sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static RECORDED_SHA: OnceCell<String> = OnceCell::new();

/// Install the process-wide subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Subscriber`] when a global subscriber is already
/// installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let (json, text) = match config.format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(false),
            ),
            None,
        ),
        LogFormat::Pretty => (None, Some(fmt::layer().compact().with_target(false))),
    };
    tracing_subscriber::registry()
        .with(level_filter(config.level))
        .with(json)
        .with(text)
        .try_init()
        .map_err(|source| TelemetryError::Subscriber { source })?;
    let _ = RECORDED_SHA.set(config.build_sha.to_string());
    Ok(())
}

/// Build identifier attached to spans and logs.
///
/// Before logging is initialised this is the compile-time `TROVE_BUILD_SHA`,
/// or `dev` when that was not set.
#[must_use]
pub fn build_sha() -> &'static str {
    RECORDED_SHA
        .get()
        .map_or_else(|| option_env!("TROVE_BUILD_SHA").unwrap_or("dev"), String::as_str)
}

/// Inputs for [`init_logging`].
#[derive(Debug, Clone, Copy)]
pub struct LoggingConfig<'a> {
    /// Fallback level directive, such as `info` or `trove_fleet=debug`.
    pub level: &'a str,
    /// Output encoding.
    pub format: LogFormat,
    /// Build identifier to record.
    pub build_sha: &'a str,
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Compact human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Text in debug builds, JSON in release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Case-insensitive `json` or `pretty`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else if value.eq_ignore_ascii_case("pretty") {
            Some(Self::Pretty)
        } else {
            None
        }
    }
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
