//! Liveness and metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::errors::ApiError;
use crate::state::ApiState;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub(crate) async fn ping() -> &'static str {
    "OK"
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.metrics.render() {
        Ok(body) => {
            Ok((StatusCode::OK, [(CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response())
        }
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}
