//! Per-route request accounting.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use trove_telemetry::{Metrics, with_request_context};

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

/// Runs the handler with its request id in task-local context, then counts
/// the response under the matched route template.
pub(crate) async fn track_request(
    State(metrics): State<Metrics>,
    request: Request,
    next: Next,
) -> Response {
    let route = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_owned(),
        |matched| matched.as_str().to_owned(),
    );
    let request_id = request
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_default();
    let response = with_request_context(request_id, next.run(request)).await;
    metrics.inc_http_request(&route, response.status().as_u16());
    response
}
