//! Fleet domain types shared by the record store, the reconciler, and the API.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub i64);

impl Display for WorkerId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Stable identifier of a download location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub i64);

/// Stable identifier of a persisted torrent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl Display for RecordId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Persisted configuration of one remote worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInstance {
    /// Worker identifier.
    pub id: WorkerId,
    /// Backend-type tag resolved through the backend registry.
    pub backend: String,
    /// Backend connection parameters.
    pub params: serde_json::Value,
}

/// Filesystem root that workers download into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLocation {
    /// Location identifier.
    pub id: LocationId,
    /// Root path as reported by workers.
    pub path: String,
    /// External source this location is reserved for, if any.
    pub source_affinity: Option<String>,
    /// Whether externally sourced admissions land here.
    pub is_primary: bool,
}

/// Compound identity key `(announce_set_hash, content_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Hash of the announce tiers.
    pub announce_set_hash: String,
    /// Info hash of the content.
    pub content_hash: String,
}

impl Display for RecordKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.announce_set_hash, self.content_hash)
    }
}

/// One torrent as reported by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSnapshot {
    /// Info hash reported by the worker, uppercase hex.
    pub content_hash: String,
    /// Display name.
    pub name: String,
    /// Total size of the payload in bytes.
    pub size_bytes: u64,
    /// Bytes uploaded since the torrent was added.
    pub uploaded_bytes: u64,
    /// Completion fraction in `[0, 1]`.
    pub done: f64,
    /// When the worker admitted the torrent.
    pub date_added: DateTime<Utc>,
    /// Error string reported by the worker.
    pub error: Option<String>,
    /// Directory the worker downloads into, matched against download locations.
    pub location_path: String,
    /// Tiered announce URLs reported by the worker.
    pub announce_tiers: Vec<Vec<String>>,
}

/// Torrent record fields, before or after persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    /// Hash of the announce tiers.
    pub announce_set_hash: String,
    /// Info hash of the content.
    pub content_hash: String,
    /// Owning worker.
    pub worker_id: WorkerId,
    /// Owning download location.
    pub location_id: LocationId,
    /// Display name.
    pub name: String,
    /// Total size of the payload in bytes.
    pub size_bytes: u64,
    /// Bytes uploaded since the torrent was added.
    pub uploaded_bytes: u64,
    /// Completion fraction in `[0, 1]`.
    pub done: f64,
    /// When the worker admitted the torrent.
    pub date_added: DateTime<Utc>,
    /// Error string reported by the worker.
    pub error: Option<String>,
    /// Encoded announce tiers (see [`crate::encode_announces`]).
    pub announces: String,
}

impl TorrentRecord {
    /// Compound identity key of the record.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            announce_set_hash: self.announce_set_hash.clone(),
            content_hash: self.content_hash.clone(),
        }
    }

    /// Whether the payload is not fully downloaded yet.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.done < 1.0
    }
}

/// Torrent record that exists in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTorrentRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Record fields.
    #[serde(flatten)]
    pub record: TorrentRecord,
}

/// Pending admission waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAddition {
    /// Queue entry identifier.
    pub id: i64,
    /// Identity of the queued torrent.
    pub key: RecordKey,
    /// When the entry was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Lower values are served first.
    pub priority_delay: i32,
    /// Destination directory passed to the worker.
    pub destination_path: String,
}

impl QueuedAddition {
    /// Serving order: lower delay first, then newest first.
    #[must_use]
    pub fn serve_order(&self, other: &Self) -> Ordering {
        self.priority_delay
            .cmp(&other.priority_delay)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Queue insertion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueuedAddition {
    /// Identity of the torrent to admit.
    pub key: RecordKey,
    /// Lower values are served first.
    pub priority_delay: i32,
    /// Destination directory passed to the worker.
    pub destination_path: String,
}

/// Mapping from an external tracker id to a content identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerTorrent {
    /// Tracker name, e.g. `what.cd`.
    pub tracker: String,
    /// Tracker-side torrent identifier.
    pub torrent_id: i64,
    /// Identity of the downloaded torrent file.
    pub key: RecordKey,
    /// Encoded announce tiers.
    pub announces: String,
    /// When the metadata was fetched.
    pub retrieved_at: DateTime<Utc>,
}

/// Download status reported by the status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// No worker holds the identity.
    Missing,
    /// A worker holds the identity and is still downloading.
    Downloading {
        /// Completion fraction in `[0, 1]`.
        progress: f64,
    },
    /// A worker holds the fully downloaded identity.
    Downloaded,
}

impl ItemStatus {
    /// Derive the status from an optional persisted record.
    #[must_use]
    pub fn from_record(record: Option<&PersistedTorrentRecord>) -> Self {
        match record {
            None => Self::Missing,
            Some(found) if found.record.is_incomplete() => Self::Downloading {
                progress: found.record.done,
            },
            Some(_) => Self::Downloaded,
        }
    }
}
