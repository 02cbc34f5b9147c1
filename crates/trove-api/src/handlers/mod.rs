//! Route handlers grouped by resource.

pub(crate) mod health;
pub(crate) mod torrents;
pub(crate) mod trackers;

use crate::errors::ApiError;

/// Trimmed non-empty parameter, or a `missing_parameter` error.
fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::missing(message))
}

fn parse_id(raw: &str, name: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::invalid(format!("{name} must be an integer")))
}
