//! Shared fixtures for the crate's unit tests.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use trove_data::{DataError, DataResult, FleetStore, MemoryFleetStore, RecordFilter};
use trove_store::ContentStore;
use trove_telemetry::Metrics;
use trove_test_support::RecordingBackend;
use trove_torrent_core::{
    DownloadLocation, NewQueuedAddition, PersistedTorrentRecord, QueuedAddition, RecordId,
    RecordKey, TorrentRecord, TrackerTorrent, WorkerId, WorkerInstance,
};

use crate::manager::{FleetManager, FleetSettings};
use crate::state::{FleetState, WorkerHandle};

pub(crate) struct Harness {
    pub(crate) manager: Arc<FleetManager>,
    pub(crate) store: Arc<MemoryFleetStore>,
    pub(crate) backends: Vec<Arc<RecordingBackend>>,
    pub(crate) workers: Vec<WorkerId>,
    pub(crate) _dir: tempfile::TempDir,
}

/// Fleet of `workers` recording backends over an in-memory store with one
/// primary location at `/downloads`.
pub(crate) async fn harness(workers: usize) -> Result<Harness, Box<dyn Error>> {
    let store = Arc::new(MemoryFleetStore::new());
    store.add_location("/downloads", None, true).await?;
    let mut handles = Vec::new();
    let mut backends = Vec::new();
    for _ in 0..workers {
        let id = store.add_worker("fake", serde_json::Value::Null).await;
        let backend = Arc::new(RecordingBackend::new());
        handles.push(WorkerHandle {
            instance: WorkerInstance {
                id,
                backend: "fake".into(),
                params: serde_json::Value::Null,
            },
            backend: backend.clone(),
        });
        backends.push(backend);
    }
    let workers = handles.iter().map(WorkerHandle::id).collect();
    let dir = tempfile::tempdir()?;
    let manager = Arc::new(FleetManager::new(
        store.clone(),
        Arc::new(FleetState::from_handles(handles)),
        ContentStore::new(dir.path()),
        Metrics::new()?,
        FleetSettings::default(),
    ));
    Ok(Harness {
        manager,
        store,
        backends,
        workers,
        _dir: dir,
    })
}

/// Memory store whose named batch writes (`insert_records`, `update_records`,
/// `delete_records`) always fail.
pub(crate) struct BrokenWrites {
    pub(crate) inner: MemoryFleetStore,
    broken: Vec<&'static str>,
}

impl BrokenWrites {
    pub(crate) fn new(broken: &[&'static str]) -> Self {
        Self {
            inner: MemoryFleetStore::new(),
            broken: broken.to_vec(),
        }
    }

    fn check(&self, operation: &'static str) -> DataResult<()> {
        if self.broken.contains(&operation) {
            return Err(DataError::ConstraintViolation {
                operation,
                constraint: "broken_for_test",
                key: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FleetStore for BrokenWrites {
    async fn workers(&self) -> DataResult<Vec<WorkerInstance>> {
        self.inner.workers().await
    }

    async fn locations(&self) -> DataResult<Vec<DownloadLocation>> {
        self.inner.locations().await
    }

    async fn records_for_worker(
        &self,
        worker: WorkerId,
        filter: &RecordFilter,
    ) -> DataResult<Vec<PersistedTorrentRecord>> {
        self.inner.records_for_worker(worker, filter).await
    }

    async fn records_by_content_hashes(
        &self,
        hashes: &[String],
    ) -> DataResult<Vec<PersistedTorrentRecord>> {
        self.inner.records_by_content_hashes(hashes).await
    }

    async fn records_by_keys(&self, keys: &[RecordKey]) -> DataResult<Vec<PersistedTorrentRecord>> {
        self.inner.records_by_keys(keys).await
    }

    async fn record(&self, id: RecordId) -> DataResult<Option<PersistedTorrentRecord>> {
        self.inner.record(id).await
    }

    async fn record_counts(&self) -> DataResult<HashMap<WorkerId, u64>> {
        self.inner.record_counts().await
    }

    async fn insert_records(&self, records: &[TorrentRecord]) -> DataResult<()> {
        self.check("insert_records")?;
        self.inner.insert_records(records).await
    }

    async fn insert_record(&self, record: &TorrentRecord) -> DataResult<RecordId> {
        self.check("insert_record")?;
        self.inner.insert_record(record).await
    }

    async fn update_records(&self, records: &[PersistedTorrentRecord]) -> DataResult<()> {
        self.check("update_records")?;
        self.inner.update_records(records).await
    }

    async fn delete_records(&self, worker: WorkerId, content_hashes: &[String]) -> DataResult<u64> {
        self.check("delete_records")?;
        self.inner.delete_records(worker, content_hashes).await
    }

    async fn delete_record(&self, id: RecordId) -> DataResult<bool> {
        self.inner.delete_record(id).await
    }

    async fn enqueue(&self, entry: &NewQueuedAddition) -> DataResult<bool> {
        self.inner.enqueue(entry).await
    }

    async fn queue_head(&self) -> DataResult<Option<QueuedAddition>> {
        self.inner.queue_head().await
    }

    async fn remove_queued(&self, id: i64) -> DataResult<()> {
        self.inner.remove_queued(id).await
    }

    async fn queue_len(&self) -> DataResult<u64> {
        self.inner.queue_len().await
    }

    async fn upsert_tracker_torrent(&self, torrent: &TrackerTorrent) -> DataResult<()> {
        self.inner.upsert_tracker_torrent(torrent).await
    }

    async fn tracker_torrents(
        &self,
        tracker: &str,
        ids: &[i64],
    ) -> DataResult<Vec<TrackerTorrent>> {
        self.inner.tracker_torrents(tracker, ids).await
    }
}
