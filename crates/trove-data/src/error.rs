//! Error types for the data access layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use trove_torrent_core::FleetError;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug)]
pub enum DataError {
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A write would break a uniqueness constraint.
    ConstraintViolation {
        /// Operation identifier.
        operation: &'static str,
        /// Name of the violated constraint.
        constraint: &'static str,
        /// Key that collided.
        key: String,
    },
    /// A stored value could not be mapped onto the domain model.
    InvalidValue {
        /// Column that held the value.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

impl DataError {
    pub(crate) const fn query(operation: &'static str, source: sqlx::Error) -> Self {
        Self::QueryFailed { operation, source }
    }

    /// Operation identifier attached to the failure, when one exists.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::MigrationFailed { .. } => "migrate",
            Self::QueryFailed { operation, .. } | Self::ConstraintViolation { operation, .. } => {
                operation
            }
            Self::InvalidValue { .. } => "decode_row",
        }
    }
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::ConstraintViolation { .. } => {
                formatter.write_str("uniqueness constraint violated")
            }
            Self::InvalidValue { .. } => formatter.write_str("stored value is invalid"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MigrationFailed { source } => Some(source),
            Self::QueryFailed { source, .. } => Some(source),
            Self::ConstraintViolation { .. } | Self::InvalidValue { .. } => None,
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(source: sqlx::Error) -> Self {
        Self::QueryFailed {
            operation: "sqlx operation",
            source,
        }
    }
}

impl From<DataError> for FleetError {
    fn from(err: DataError) -> Self {
        Self::PersistFailure {
            operation: err.operation(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_display_and_source() {
        let migration = DataError::MigrationFailed {
            source: sqlx::migrate::MigrateError::VersionMissing(1),
        };
        assert_eq!(migration.to_string(), "migration failed");
        assert!(migration.source().is_some());

        let query = DataError::query("records_for_worker", sqlx::Error::RowNotFound);
        assert_eq!(query.to_string(), "database operation failed");
        assert!(query.source().is_some());

        let constraint = DataError::ConstraintViolation {
            operation: "insert_record",
            constraint: "fleet_torrents_identity",
            key: "A/B".to_string(),
        };
        assert_eq!(constraint.to_string(), "uniqueness constraint violated");
        assert!(constraint.source().is_none());

        let from = DataError::from(sqlx::Error::RowNotFound);
        assert_eq!(from.operation(), "sqlx operation");
    }

    #[test]
    fn data_errors_become_persist_failures() {
        let fleet: FleetError = DataError::InvalidValue {
            field: "size_bytes",
            value: "-1".to_string(),
        }
        .into();
        assert!(matches!(
            fleet,
            FleetError::PersistFailure {
                operation: "decode_row",
                ..
            }
        ));
        assert_eq!(fleet.error_code(), "persist_failure");
    }
}
