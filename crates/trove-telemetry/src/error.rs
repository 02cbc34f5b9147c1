//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::string::FromUtf8Error;

use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Step of collector setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorStage {
    /// Building the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    Subscriber {
        /// Underlying subscriber error.
        source: TryInitError,
    },
    /// A Prometheus collector could not be set up.
    Collector {
        /// Metric family name.
        name: &'static str,
        /// Setup step that failed.
        stage: CollectorStage,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be encoded for `/metrics`.
    Exposition {
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The encoded exposition was not UTF-8.
    ExpositionText {
        /// Underlying conversion error.
        source: FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn collector(
        name: &'static str,
        stage: CollectorStage,
        source: prometheus::Error,
    ) -> Self {
        Self::Collector {
            name,
            stage,
            source,
        }
    }
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::Subscriber { .. } => "tracing subscriber could not be installed",
            Self::Collector {
                stage: CollectorStage::Build,
                ..
            } => "metrics collector could not be built",
            Self::Collector {
                stage: CollectorStage::Register,
                ..
            } => "metrics collector could not be registered",
            Self::Exposition { .. } => "metrics exposition failed",
            Self::ExpositionText { .. } => "metrics exposition was not utf-8",
        };
        formatter.write_str(message)
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Subscriber { source } => Some(source),
            Self::Collector { source, .. } | Self::Exposition { source } => Some(source),
            Self::ExpositionText { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{IntGauge, Registry};

    type TestResult = std::result::Result<(), Box<dyn Error>>;

    #[test]
    fn duplicate_registration_reports_register_stage() -> TestResult {
        let registry = Registry::new();
        let gauge = IntGauge::new("queue_depth", "Queued admissions")?;
        registry.register(Box::new(gauge.clone()))?;
        let err = match registry.register(Box::new(gauge)) {
            Ok(()) => return Err("second registration should fail".into()),
            Err(source) => {
                TelemetryError::collector("queue_depth", CollectorStage::Register, source)
            }
        };
        assert_eq!(err.to_string(), "metrics collector could not be registered");
        assert!(err.source().is_some());
        assert!(matches!(
            err,
            TelemetryError::Collector {
                name: "queue_depth",
                stage: CollectorStage::Register,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn exposition_text_keeps_its_source() {
        let Err(source) = String::from_utf8(vec![0xff, 0xfe]) else {
            unreachable!("invalid utf-8 input");
        };
        let err = TelemetryError::ExpositionText { source };
        assert_eq!(err.to_string(), "metrics exposition was not utf-8");
        assert!(err.source().is_some());
    }
}
