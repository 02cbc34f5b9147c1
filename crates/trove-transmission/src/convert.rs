//! Mapping of `torrent-get` rows onto fleet snapshots.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use trove_torrent_core::TorrentSnapshot;

use crate::error::TransmissionError;

#[derive(Debug, Deserialize)]
struct TorrentList {
    #[serde(default)]
    torrents: Vec<TorrentRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TorrentRow {
    name: String,
    hash_string: String,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    uploaded_ever: i64,
    #[serde(default)]
    percent_done: f64,
    #[serde(default)]
    added_date: i64,
    #[serde(default)]
    error: i64,
    #[serde(default)]
    error_string: String,
    download_dir: String,
    #[serde(default)]
    trackers: Vec<TrackerRow>,
}

#[derive(Debug, Deserialize)]
struct TrackerRow {
    announce: String,
    #[serde(default)]
    tier: i64,
}

pub(crate) fn snapshots(arguments: Value) -> Result<Vec<TorrentSnapshot>, TransmissionError> {
    let list: TorrentList =
        serde_json::from_value(arguments).map_err(|source| TransmissionError::Decode {
            method: "torrent-get",
            source,
        })?;
    Ok(list.torrents.into_iter().map(snapshot).collect())
}

fn snapshot(row: TorrentRow) -> TorrentSnapshot {
    // Workers receive `<location>/<torrent id>` as their download directory.
    let location_path = Path::new(&row.download_dir)
        .parent()
        .map_or_else(|| row.download_dir.clone(), |parent| parent.display().to_string());
    TorrentSnapshot {
        content_hash: row.hash_string.to_uppercase(),
        name: row.name,
        size_bytes: u64::try_from(row.total_size).unwrap_or(0),
        uploaded_bytes: u64::try_from(row.uploaded_ever).unwrap_or(0),
        done: row.percent_done.clamp(0.0, 1.0),
        date_added: DateTime::<Utc>::from_timestamp(row.added_date, 0).unwrap_or_default(),
        error: (row.error != 0).then_some(row.error_string),
        location_path,
        announce_tiers: tiers(row.trackers),
    }
}

fn tiers(trackers: Vec<TrackerRow>) -> Vec<Vec<String>> {
    let mut grouped: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for tracker in trackers {
        grouped.entry(tracker.tier).or_default().push(tracker.announce);
    }
    grouped.into_values().collect()
}
