//! Add, delete, and status endpoints for fleet torrents.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, Multipart, Query, State};
use serde::Deserialize;
use trove_fleet::{StatusQuery, lookup_status};
use trove_torrent_core::{ItemStatus, RecordId};

use super::{parse_id, required};
use crate::errors::{ApiError, Envelope};
use crate::state::ApiState;

pub(crate) async fn add_torrent(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Json<Envelope>, ApiError> {
    let mut torrent = None;
    let mut path = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("torrent") => torrent = Some(field.bytes().await?),
            Some("path") => path = Some(field.text().await?),
            _ => {}
        }
    }
    let torrent = torrent
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::missing("please supply a torrent file"))?;
    let path = required(path, "please supply a path parameter")?;

    let added = state.manager.add_item(&torrent, &path).await?;
    Ok(Json(Envelope {
        worker_id: Some(added.worker_id),
        info_hash: Some(added.identity.content_hash),
        ..Envelope::ok()
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteForm {
    id: Option<String>,
}

pub(crate) async fn delete_torrent(
    State(state): State<Arc<ApiState>>,
    Form(form): Form<DeleteForm>,
) -> Result<Json<Envelope>, ApiError> {
    let raw = required(form.id, "please supply an id parameter")?;
    let id = parse_id(&raw, "id")?;
    state.manager.delete_item(RecordId(id)).await?;
    Ok(Json(Envelope::ok()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusParams {
    info_hashes: Option<String>,
    tracker: Option<String>,
    ids: Option<String>,
}

pub(crate) async fn torrent_status(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<StatusParams>,
) -> Result<Json<BTreeMap<String, ItemStatus>>, ApiError> {
    let mut queries = Vec::new();
    if let Some(hashes) = params.info_hashes.as_deref() {
        queries.push(StatusQuery::ContentHashes(split_list(hashes)));
    }
    if let (Some(tracker), Some(ids)) = (params.tracker, params.ids) {
        let ids = split_list(&ids)
            .iter()
            .map(|id| parse_id(id, "ids"))
            .collect::<Result<Vec<_>, _>>()?;
        queries.push(StatusQuery::Tracker { tracker, ids });
    }
    if queries.is_empty() {
        return Err(ApiError::missing("please supply info_hashes, or tracker and ids"));
    }

    let mut statuses = BTreeMap::new();
    for query in &queries {
        statuses.extend(lookup_status(state.manager.store().as_ref(), query).await?);
    }
    Ok(Json(statuses))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_skip_blank_items() {
        assert_eq!(split_list("a, b,,c ,"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
