//! Record store contract consumed by the fleet core.

use std::collections::HashMap;

use async_trait::async_trait;
use trove_torrent_core::{
    DownloadLocation, NewQueuedAddition, PersistedTorrentRecord, QueuedAddition, RecordId,
    RecordKey, TorrentRecord, TrackerTorrent, WorkerId, WorkerInstance,
};

use crate::error::Result;

/// Subset of a worker's records to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Every record owned by the worker.
    All,
    /// Records with `done < 1`.
    Incomplete,
    /// Records whose content hash is in the list.
    ContentHashes(Vec<String>),
}

/// Persistence operations for workers, locations, records, the admission
/// queue, and tracker mappings.
///
/// Every multi-row write is atomic: it either applies completely or not at all.
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// All configured workers, ordered by id.
    async fn workers(&self) -> Result<Vec<WorkerInstance>>;

    /// All download locations, ordered by id.
    async fn locations(&self) -> Result<Vec<DownloadLocation>>;

    /// The primary download location, if one is flagged.
    async fn primary_location(&self) -> Result<Option<DownloadLocation>> {
        Ok(self
            .locations()
            .await?
            .into_iter()
            .find(|location| location.is_primary))
    }

    /// Records owned by one worker, narrowed by `filter`.
    async fn records_for_worker(
        &self,
        worker: WorkerId,
        filter: &RecordFilter,
    ) -> Result<Vec<PersistedTorrentRecord>>;

    /// Records whose content hash is in `hashes`, across every announce set and worker.
    async fn records_by_content_hashes(
        &self,
        hashes: &[String],
    ) -> Result<Vec<PersistedTorrentRecord>>;

    /// Records matching one of the exact identity keys.
    async fn records_by_keys(&self, keys: &[RecordKey]) -> Result<Vec<PersistedTorrentRecord>>;

    /// A single record by id.
    async fn record(&self, id: RecordId) -> Result<Option<PersistedTorrentRecord>>;

    /// Number of records per worker; workers without records are absent.
    async fn record_counts(&self) -> Result<HashMap<WorkerId, u64>>;

    /// Insert every record in one atomic unit.
    async fn insert_records(&self, records: &[TorrentRecord]) -> Result<()>;

    /// Insert one record in its own atomic unit.
    async fn insert_record(&self, record: &TorrentRecord) -> Result<RecordId>;

    /// Overwrite the fields of existing records in one atomic unit.
    async fn update_records(&self, records: &[PersistedTorrentRecord]) -> Result<()>;

    /// Delete a worker's records by content hash in one atomic unit.
    async fn delete_records(&self, worker: WorkerId, content_hashes: &[String]) -> Result<u64>;

    /// Delete one record; returns whether it existed.
    async fn delete_record(&self, id: RecordId) -> Result<bool>;

    /// Queue an admission; returns `false` when the identity is already queued.
    async fn enqueue(&self, entry: &NewQueuedAddition) -> Result<bool>;

    /// The entry that should be served next.
    async fn queue_head(&self) -> Result<Option<QueuedAddition>>;

    /// Drop a queue entry.
    async fn remove_queued(&self, id: i64) -> Result<()>;

    /// Number of queued admissions.
    async fn queue_len(&self) -> Result<u64>;

    /// Insert or refresh a tracker id mapping.
    async fn upsert_tracker_torrent(&self, torrent: &TrackerTorrent) -> Result<()>;

    /// Tracker id mappings for the given tracker and ids.
    async fn tracker_torrents(&self, tracker: &str, ids: &[i64]) -> Result<Vec<TrackerTorrent>>;
}
