//! # Design
//!
//! - Centralize bootstrap errors in one enum.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: trove_config::ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: trove_telemetry::TelemetryError,
    },
    /// The database pool could not be opened.
    #[error("database connection failed")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Source database error.
        source: sqlx::Error,
    },
    /// The record store could not be prepared.
    #[error("record store operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data-layer error.
        source: trove_data::DataError,
    },
    /// The fleet could not be loaded.
    #[error("fleet operation failed")]
    Fleet {
        /// Operation identifier.
        operation: &'static str,
        /// Source fleet error.
        source: trove_torrent_core::FleetError,
    },
    /// A tracker client could not be built.
    #[error("tracker operation failed")]
    Tracker {
        /// Operation identifier.
        operation: &'static str,
        /// Source tracker error.
        source: trove_tracker::TrackerError,
    },
    /// The HTTP server failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source server error.
        source: trove_api::ServeError,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: trove_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: trove_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: trove_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn fleet(
        operation: &'static str,
        source: trove_torrent_core::FleetError,
    ) -> Self {
        Self::Fleet { operation, source }
    }

    pub(crate) const fn tracker(
        operation: &'static str,
        source: trove_tracker::TrackerError,
    ) -> Self {
        Self::Tracker { operation, source }
    }

    pub(crate) const fn api_server(operation: &'static str, source: trove_api::ServeError) -> Self {
        Self::ApiServer { operation, source }
    }
}
