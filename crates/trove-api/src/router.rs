//! Router construction and server host.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Request;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};
use trove_telemetry::build_sha;

use crate::errors::ServeError;
use crate::handlers::health::{metrics, ping};
use crate::handlers::torrents::{add_torrent, delete_torrent, torrent_status};
use crate::handlers::trackers::add_tracker_torrent;
use crate::state::ApiState;
use crate::telemetry::{HEADER_REQUEST_ID, track_request};

/// Axum router wrapper hosting the fleet API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the route table over `state`.
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(trove_telemetry::propagate_request_id_layer())
            .layer(trove_telemetry::set_request_id_layer())
            .layer(trace_layer)
            .layer(from_fn_with_state(state.metrics.clone(), track_request));

        let router = Router::new()
            .route("/ping", get(ping))
            .route("/metrics", get(metrics))
            .route("/torrents/add", post(add_torrent))
            .route("/torrents/delete", post(delete_torrent))
            .route("/torrents/status", get(torrent_status))
            .route("/trackers/add", post(add_tracker_torrent))
            .route_layer(layered)
            .with_state(Arc::new(state));
        Self { router }
    }

    /// Clone of the route table, for embedding or in-process requests.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `addr` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError`] when the listener cannot be bound or the server
    /// fails.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        info!(addr = %addr, "http server listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ServeError::Serve { source })
    }
}
