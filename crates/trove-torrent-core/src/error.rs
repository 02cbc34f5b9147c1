//! # Design
//!
//! - One taxonomy for every failure that crosses the fleet core boundary.
//! - Keep error messages constant; store operational context in fields.
//! - Expose a stable machine-readable code for the HTTP envelope.

use std::error::Error;

use thiserror::Error;

use crate::model::WorkerId;

/// Primary error type for fleet operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Binary torrent data (or an identity hash) could not be decoded.
    #[error("malformed binary data")]
    MalformedBinaryData {
        /// Static reason describing the defect.
        reason: &'static str,
        /// Byte offset of the defect when known.
        offset: Option<usize>,
    },
    /// Stored bytes differ from new bytes that hash to the same identity.
    #[error("identity collision")]
    IdentityCollision {
        /// Announce-set hash of the colliding identity.
        announce_set_hash: String,
        /// Content hash of the colliding identity.
        content_hash: String,
    },
    /// A requested entity does not exist.
    #[error("not found")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Key used for the lookup.
        key: String,
    },
    /// A worker backend could not service the request.
    #[error("worker backend unavailable")]
    BackendUnavailable {
        /// Backend operation that failed.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The exact identity is already placed or currently being placed.
    #[error("torrent has already been added")]
    AlreadyPlaced {
        /// Content hash of the duplicate identity.
        content_hash: String,
        /// Worker holding the identity, when it is already persisted.
        worker_id: Option<WorkerId>,
    },
    /// Every worker already holds the content hash under another announce set.
    #[error(
        "torrents with the same info hash but different announce URLs exist, but no more instances are available"
    )]
    NoEligibleWorker {
        /// Content hash that could not be placed.
        content_hash: String,
        /// Number of workers excluded because they hold the content hash.
        excluded: usize,
    },
    /// The fleet has no workers at all.
    #[error("no instances are available")]
    NoWorkersConfigured,
    /// The external metadata API rejected our credentials or session.
    #[error("authentication failed")]
    AuthenticationFailed {
        /// Static reason describing the rejection.
        reason: &'static str,
    },
    /// The external metadata API reported its own rate limit.
    #[error("rate limit exceeded")]
    RateLimitRejected {
        /// Action that was rejected.
        action: String,
    },
    /// The external metadata API rejected an identifier parameter.
    #[error("bad identifier")]
    BadIdentifier {
        /// Action that was rejected.
        action: String,
    },
    /// A request to the external metadata API failed.
    #[error("request failed")]
    RequestFailed {
        /// Operation that failed.
        operation: &'static str,
        /// Detail reported by the remote side or transport.
        detail: String,
    },
    /// Writing to or reading from the record store failed.
    #[error("persistence failure")]
    PersistFailure {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl FleetError {
    /// Build a malformed-data error with an optional byte offset.
    #[must_use]
    pub const fn malformed(reason: &'static str, offset: Option<usize>) -> Self {
        Self::MalformedBinaryData { reason, offset }
    }

    /// Build a not-found error for the given entity and key.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Wrap a transport or protocol failure raised by a worker backend.
    pub fn backend(operation: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        Self::BackendUnavailable {
            operation,
            source: Box::new(source),
        }
    }

    /// Wrap a failure raised by the record store.
    pub fn persist(operation: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        Self::PersistFailure {
            operation,
            source: Box::new(source),
        }
    }

    /// Build a request failure with a detail message.
    #[must_use]
    pub fn request(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation,
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code reported to API callers.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedBinaryData { .. } => "malformed_binary_data",
            Self::IdentityCollision { .. } => "identity_collision",
            Self::NotFound { .. } => "not_found",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::AlreadyPlaced { .. } => "torrent_already_added",
            Self::NoEligibleWorker { .. } => "no_eligible_worker",
            Self::NoWorkersConfigured => "no_workers_configured",
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::RateLimitRejected { .. } => "rate_limit_exceeded",
            Self::BadIdentifier { .. } => "bad_id",
            Self::RequestFailed { .. } => "request_failed",
            Self::PersistFailure { .. } => "persist_failure",
        }
    }
}

/// Convenience alias for fleet operation results.
pub type FleetResult<T> = Result<T, FleetError>;
