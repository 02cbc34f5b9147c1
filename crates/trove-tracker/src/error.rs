//! # Design
//!
//! - Constant messages; the action, status, or path travels in fields.
//! - Keep transport, protocol, and API-level rejections apart so retries can
//!   tell them apart.
//! - Collapse into [`FleetError`] when handed to the fleet core.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use trove_torrent_core::FleetError;

/// Result type for tracker client operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors produced by the tracker metadata client.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Transport failure talking to the tracker.
    #[error("tracker transport failure")]
    Transport {
        /// Operation in flight.
        operation: &'static str,
        /// Underlying HTTP error.
        source: reqwest::Error,
    },
    /// The tracker answered with an unexpected HTTP status.
    #[error("tracker returned unexpected status")]
    UnexpectedStatus {
        /// Operation in flight.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// The session expired and logging in again was not allowed or did not help.
    #[error("tracker session expired")]
    SessionExpired {
        /// Action that was redirected to the login page.
        action: String,
    },
    /// The login form was rendered again, meaning the credentials were refused.
    #[error("tracker login rejected")]
    LoginRejected,
    /// The tracker reported `bad id parameter`.
    #[error("tracker rejected identifier")]
    BadId {
        /// Action that was rejected.
        action: String,
    },
    /// The tracker reported `rate limit exceeded`.
    #[error("tracker rate limit exceeded")]
    RateLimited {
        /// Action that was rejected.
        action: String,
    },
    /// The tracker reported some other failure.
    #[error("tracker request failed")]
    Api {
        /// Action that failed.
        action: String,
        /// Error text reported by the tracker.
        message: String,
    },
    /// A response body could not be decoded.
    #[error("tracker response could not be decoded")]
    Decode {
        /// Operation in flight.
        operation: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A response lacked an expected field or header.
    #[error("tracker response missing field")]
    MissingField {
        /// Operation in flight.
        operation: &'static str,
        /// Field or header name.
        field: &'static str,
    },
    /// A download did not return a torrent file.
    #[error("tracker download was not a torrent file")]
    NotATorrent {
        /// Content type received, if any.
        content_type: Option<String>,
    },
    /// Client settings are invalid.
    #[error("tracker client configuration invalid")]
    InvalidSettings {
        /// Setting name.
        field: &'static str,
        /// Static reason.
        reason: &'static str,
    },
    /// Session cache file could not be read or written.
    #[error("tracker session cache io failure")]
    SessionIo {
        /// Operation in flight.
        operation: &'static str,
        /// Cache file path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Session cache file held invalid JSON.
    #[error("tracker session cache is corrupt")]
    SessionFormat {
        /// Cache file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl TrackerError {
    pub(crate) const fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Whether the failure means the credentials are unusable.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::SessionExpired { .. } | Self::LoginRejected)
    }
}

impl From<TrackerError> for FleetError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::SessionExpired { .. } => Self::AuthenticationFailed {
                reason: "session expired after login",
            },
            TrackerError::LoginRejected => Self::AuthenticationFailed {
                reason: "login form rejected credentials",
            },
            TrackerError::BadId { action } => Self::BadIdentifier { action },
            TrackerError::RateLimited { action } => Self::RateLimitRejected { action },
            TrackerError::Api { message, .. } => Self::request("tracker_api", message),
            TrackerError::Transport { operation, source } => {
                Self::request(operation, source.to_string())
            }
            TrackerError::UnexpectedStatus { operation, status } => {
                Self::request(operation, format!("status {status}"))
            }
            TrackerError::Decode { operation, source } => {
                Self::request(operation, source.to_string())
            }
            TrackerError::MissingField { operation, field } => {
                Self::request(operation, format!("missing {field}"))
            }
            TrackerError::NotATorrent { content_type } => Self::request(
                "download_torrent",
                format!(
                    "unexpected content type {}",
                    content_type.as_deref().unwrap_or("<none>")
                ),
            ),
            TrackerError::InvalidSettings { field, reason } => {
                Self::request("configure_tracker", format!("{field}: {reason}"))
            }
            err @ (TrackerError::SessionIo { .. } | TrackerError::SessionFormat { .. }) => {
                Self::persist("session_cache", err)
            }
        }
    }
}
