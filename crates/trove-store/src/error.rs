//! # Design
//!
//! - Constant-message errors for the content store.
//! - Paths and operations travel as fields so failures can be asserted in tests.
//! - Collapse into [`FleetError`] at the crate boundary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use trove_torrent_core::FleetError;

/// Result type for content store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("content store io failure")]
    Io {
        /// Operation that touched the filesystem.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Hash argument is not 40 hex characters.
    #[error("content store hash is malformed")]
    InvalidHash {
        /// Argument name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// A different description already occupies the identity's path.
    #[error("content store identity collision")]
    Collision {
        /// Path holding the conflicting bytes.
        path: PathBuf,
        /// Hash of the announce tiers.
        announce_set_hash: String,
        /// Info hash.
        content_hash: String,
    },
    /// No description is stored under the identity.
    #[error("content store entry not found")]
    Missing {
        /// Path that was probed.
        path: PathBuf,
    },
    /// The description itself could not be parsed.
    #[error("content store rejected torrent description")]
    Identity {
        /// Underlying derivation failure.
        source: FleetError,
    },
}

impl StoreError {
    pub(crate) const fn io(operation: &'static str, path: PathBuf, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }
}

impl From<StoreError> for FleetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { operation, .. } => Self::persist(operation, err),
            StoreError::InvalidHash { .. } => {
                Self::malformed("identity hash must be 40 hex characters", None)
            }
            StoreError::Collision {
                announce_set_hash,
                content_hash,
                ..
            } => Self::IdentityCollision {
                announce_set_hash,
                content_hash,
            },
            StoreError::Missing { path } => {
                Self::not_found("torrent file", path.display().to_string())
            }
            StoreError::Identity { source } => source,
        }
    }
}
