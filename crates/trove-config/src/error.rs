//! Error types for configuration loading.
//!
//! # Design
//! - Constant messages; the offending section, field and value travel in fields.
//! - Invalid values carry a static reason so callers can report them verbatim.

use thiserror::Error;

/// Errors produced while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("missing configuration field")]
    MissingField {
        /// Section the field belongs to.
        section: &'static str,
        /// Environment variable name.
        field: String,
    },
    /// A variable was set to an unusable value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section the field belongs to.
        section: &'static str,
        /// Environment variable name.
        field: String,
        /// Raw value, omitted for secrets.
        value: Option<String>,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn missing(section: &'static str, field: &str) -> Self {
        Self::MissingField {
            section,
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(
        section: &'static str,
        field: &str,
        value: Option<&str>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field: field.to_string(),
            value: value.map(str::to_string),
            reason,
        }
    }

    /// Environment variable the error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => field,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_constant_and_field_is_exposed() {
        let err = ConfigError::invalid(
            "fleet",
            "TROVE_UPDATE_POOL_SIZE",
            Some("0"),
            "must be positive",
        );
        assert_eq!(err.to_string(), "invalid configuration field");
        assert_eq!(err.field(), "TROVE_UPDATE_POOL_SIZE");

        let err = ConfigError::missing("database", "DATABASE_URL");
        assert_eq!(err.to_string(), "missing configuration field");
        assert_eq!(err.field(), "DATABASE_URL");
    }
}
