//! # Design
//!
//! - Adapter-local error context without `anyhow`.
//! - Keep error messages constant; store operational context in fields.
//! - Surfaced to the fleet core wrapped in `FleetError::BackendUnavailable`.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Debug)]
/// Failures talking to a Transmission daemon.
pub enum TransmissionError {
    /// Worker parameters could not be parsed.
    Params {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A worker parameter had an unusable value.
    InvalidParams {
        /// Parameter name.
        field: &'static str,
        /// Static reason.
        reason: &'static str,
    },
    /// The HTTP request could not be completed.
    Transport {
        /// RPC method in flight.
        method: &'static str,
        /// Underlying HTTP error.
        source: reqwest::Error,
    },
    /// The daemon kept rejecting the session id.
    SessionRejected {
        /// RPC method in flight.
        method: &'static str,
    },
    /// The daemon answered with a non-success HTTP status.
    UnexpectedStatus {
        /// RPC method in flight.
        method: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// The daemon reported a failure in the `result` field.
    Rpc {
        /// RPC method in flight.
        method: &'static str,
        /// Value of the `result` field.
        result: String,
    },
    /// The response body did not have the expected shape.
    Decode {
        /// RPC method in flight.
        method: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl Display for TransmissionError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Params { .. } => formatter.write_str("transmission parameters invalid"),
            Self::InvalidParams { .. } => formatter.write_str("transmission parameter rejected"),
            Self::Transport { .. } => formatter.write_str("transmission transport failure"),
            Self::SessionRejected { .. } => {
                formatter.write_str("transmission session id rejected")
            }
            Self::UnexpectedStatus { .. } => {
                formatter.write_str("transmission returned unexpected status")
            }
            Self::Rpc { .. } => formatter.write_str("transmission rpc failed"),
            Self::Decode { .. } => formatter.write_str("transmission response malformed"),
        }
    }
}

impl Error for TransmissionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Params { source } | Self::Decode { source, .. } => Some(source),
            Self::Transport { source, .. } => Some(source),
            Self::InvalidParams { .. }
            | Self::SessionRejected { .. }
            | Self::UnexpectedStatus { .. }
            | Self::Rpc { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_constant_and_sources_chain() {
        let err = TransmissionError::Rpc {
            method: "torrent-get",
            result: "no such torrent".into(),
        };
        assert_eq!(err.to_string(), "transmission rpc failed");
        assert!(err.source().is_none());

        let decode = serde_json::from_str::<u8>("x").err();
        let Some(source) = decode else {
            return;
        };
        let err = TransmissionError::Decode {
            method: "torrent-get",
            source,
        };
        assert_eq!(err.to_string(), "transmission response malformed");
        assert!(err.source().is_some());
    }
}
