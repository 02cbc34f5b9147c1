//! Response envelope and the mapping from fleet errors to HTTP responses.
//!
//! # Design
//! - Every mutating endpoint answers `{success, error_code?, error?}`.
//! - Error codes are stable strings; the HTTP status mirrors the failure class.
//! - Server-side failures are logged once, here.

use std::io;
use std::net::SocketAddr;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use trove_telemetry::current_request_id;
use trove_torrent_core::{FleetError, WorkerId};

pub(crate) const MISSING_PARAMETER: &str = "missing_parameter";
pub(crate) const INVALID_PARAMETER: &str = "invalid_parameter";
const TORRENT_NOT_FOUND: &str = "torrent_not_found";
const TRACKER_NOT_FOUND: &str = "tracker_not_found";

/// JSON body returned by the mutating endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Stable machine-readable failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Worker that now holds the torrent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Info hash of the affected torrent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
}

impl Envelope {
    /// Bare success body.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error_code: None,
            error: None,
            worker_id: None,
            info_hash: None,
        }
    }

    /// Failure body.
    #[must_use]
    pub const fn failure(error_code: &'static str, error: String) -> Self {
        Self {
            success: false,
            error_code: Some(error_code),
            error: Some(error),
            worker_id: None,
            info_hash: None,
        }
    }
}

/// Failure answered with an envelope body.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    const fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    pub(crate) fn missing(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, MISSING_PARAMETER, message.to_string())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_PARAMETER, message.into())
    }

    pub(crate) fn internal(message: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            message.to_string(),
        )
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        let status = match &err {
            FleetError::MalformedBinaryData { .. } | FleetError::BadIdentifier { .. } => {
                StatusCode::BAD_REQUEST
            }
            FleetError::NotFound { .. } => StatusCode::NOT_FOUND,
            FleetError::IdentityCollision { .. }
            | FleetError::AlreadyPlaced { .. }
            | FleetError::NoEligibleWorker { .. } => StatusCode::CONFLICT,
            FleetError::RateLimitRejected { .. } => StatusCode::TOO_MANY_REQUESTS,
            FleetError::BackendUnavailable { .. }
            | FleetError::AuthenticationFailed { .. }
            | FleetError::RequestFailed { .. } => StatusCode::BAD_GATEWAY,
            FleetError::NoWorkersConfigured => StatusCode::SERVICE_UNAVAILABLE,
            FleetError::PersistFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let request_id = current_request_id().unwrap_or_default();
        if status.is_server_error() {
            error!(
                error = %err,
                error_code = err.error_code(),
                request_id = %request_id,
                "request failed"
            );
        } else {
            warn!(
                error = %err,
                error_code = err.error_code(),
                request_id = %request_id,
                "request rejected"
            );
        }
        match err {
            FleetError::NotFound {
                entity: "torrent", ..
            } => Self::new(status, TORRENT_NOT_FOUND, "torrent was not found".into()),
            FleetError::NotFound {
                entity: "tracker", ..
            } => Self::new(status, TRACKER_NOT_FOUND, "tracker was not found".into()),
            other => Self::new(status, other.error_code(), other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::invalid(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Envelope::failure(self.code, self.message))).into_response()
    }
}

/// Failure hosting the HTTP server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listener could not be bound.
    #[error("failed to bind http listener")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The server stopped with an IO error.
    #[error("http server failed")]
    Serve {
        /// Underlying IO error.
        source: io::Error,
    },
}
