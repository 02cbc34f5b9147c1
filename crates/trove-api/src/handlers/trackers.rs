//! Tracker ingest endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, State};
use serde::Deserialize;

use super::{parse_id, required};
use crate::errors::{ApiError, Envelope};
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub(crate) struct TrackerAddForm {
    tracker: Option<String>,
    torrent_id: Option<String>,
}

/// Download a torrent from a tracker and queue it for placement.
pub(crate) async fn add_tracker_torrent(
    State(state): State<Arc<ApiState>>,
    Form(form): Form<TrackerAddForm>,
) -> Result<Json<Envelope>, ApiError> {
    let tracker = required(form.tracker, "please supply a tracker parameter")?;
    let raw_id = required(form.torrent_id, "please supply a torrent_id parameter")?;
    let torrent_id = parse_id(&raw_id, "torrent_id")?;

    let mapping = state.ingest.fetch(&tracker, torrent_id).await?;
    Ok(Json(Envelope {
        info_hash: Some(mapping.key.content_hash),
        ..Envelope::ok()
    }))
}
