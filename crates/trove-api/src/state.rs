//! Handles shared by every request.

use std::sync::Arc;

use trove_fleet::{FleetManager, TrackerIngest};
use trove_telemetry::Metrics;

/// Application state handed to handlers.
pub struct ApiState {
    pub(crate) manager: Arc<FleetManager>,
    pub(crate) ingest: Arc<TrackerIngest>,
    pub(crate) metrics: Metrics,
}

impl ApiState {
    /// Bundle the fleet manager, tracker ingest, and metrics registry.
    #[must_use]
    pub const fn new(
        manager: Arc<FleetManager>,
        ingest: Arc<TrackerIngest>,
        metrics: Metrics,
    ) -> Self {
        Self {
            manager,
            ingest,
            metrics,
        }
    }
}
