//! In-process [`FleetStore`] for tests and dry runs. Enforces the same
//! uniqueness rules as the schema.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use trove_torrent_core::{
    DownloadLocation, LocationId, NewQueuedAddition, PersistedTorrentRecord, QueuedAddition,
    RecordId, RecordKey, TorrentRecord, TrackerTorrent, WorkerId, WorkerInstance,
};

use crate::contract::{FleetStore, RecordFilter};
use crate::error::{DataError, Result};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    workers: BTreeMap<WorkerId, WorkerInstance>,
    locations: BTreeMap<LocationId, DownloadLocation>,
    records: BTreeMap<RecordId, TorrentRecord>,
    queue: BTreeMap<i64, QueuedAddition>,
    tracker_torrents: BTreeMap<(String, i64), TrackerTorrent>,
    next_id: i64,
}

impl MemoryState {
    const fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, operation: &'static str, record: &TorrentRecord) -> Result<RecordId> {
        for existing in self.records.values() {
            if existing.key() == record.key() {
                return Err(DataError::ConstraintViolation {
                    operation,
                    constraint: "fleet_torrents_identity",
                    key: record.key().to_string(),
                });
            }
            if existing.worker_id == record.worker_id
                && existing.content_hash == record.content_hash
            {
                return Err(DataError::ConstraintViolation {
                    operation,
                    constraint: "fleet_torrents_worker_content",
                    key: record.key().to_string(),
                });
            }
        }
        let id = RecordId(self.allocate());
        self.records.insert(id, record.clone());
        Ok(id)
    }

    fn persisted<'a>(
        &'a self,
        keep: impl Fn(&TorrentRecord) -> bool + 'a,
    ) -> impl Iterator<Item = PersistedTorrentRecord> + 'a {
        self.records
            .iter()
            .filter(move |(_, record)| keep(record))
            .map(|(id, record)| PersistedTorrentRecord {
                id: *id,
                record: record.clone(),
            })
    }
}

/// Record store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryFleetStore {
    state: Mutex<MemoryState>,
}

impl MemoryFleetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker and return its identifier.
    pub async fn add_worker(&self, backend: &str, params: serde_json::Value) -> WorkerId {
        let mut state = self.state.lock().await;
        let id = WorkerId(state.allocate());
        state.workers.insert(
            id,
            WorkerInstance {
                id,
                backend: backend.to_string(),
                params,
            },
        );
        id
    }

    /// Register a download location and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ConstraintViolation`] when the path is taken or a
    /// second primary location is flagged.
    pub async fn add_location(
        &self,
        path: &str,
        source_affinity: Option<&str>,
        is_primary: bool,
    ) -> Result<LocationId> {
        let mut state = self.state.lock().await;
        for existing in state.locations.values() {
            let constraint = if existing.path == path {
                "fleet_locations_path_key"
            } else if is_primary && existing.is_primary {
                "fleet_locations_single_primary"
            } else {
                continue;
            };
            return Err(DataError::ConstraintViolation {
                operation: "register_location",
                constraint,
                key: path.to_string(),
            });
        }
        let id = LocationId(state.allocate());
        state.locations.insert(
            id,
            DownloadLocation {
                id,
                path: path.to_string(),
                source_affinity: source_affinity.map(str::to_string),
                is_primary,
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl FleetStore for MemoryFleetStore {
    async fn workers(&self) -> Result<Vec<WorkerInstance>> {
        Ok(self.state.lock().await.workers.values().cloned().collect())
    }

    async fn locations(&self) -> Result<Vec<DownloadLocation>> {
        Ok(self.state.lock().await.locations.values().cloned().collect())
    }

    async fn records_for_worker(
        &self,
        worker: WorkerId,
        filter: &RecordFilter,
    ) -> Result<Vec<PersistedTorrentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .persisted(|record| {
                record.worker_id == worker
                    && match filter {
                        RecordFilter::All => true,
                        RecordFilter::Incomplete => record.is_incomplete(),
                        RecordFilter::ContentHashes(hashes) => {
                            hashes.contains(&record.content_hash)
                        }
                    }
            })
            .collect())
    }

    async fn records_by_content_hashes(
        &self,
        hashes: &[String],
    ) -> Result<Vec<PersistedTorrentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .persisted(|record| hashes.contains(&record.content_hash))
            .collect())
    }

    async fn records_by_keys(&self, keys: &[RecordKey]) -> Result<Vec<PersistedTorrentRecord>> {
        let state = self.state.lock().await;
        Ok(state.persisted(|record| keys.contains(&record.key())).collect())
    }

    async fn record(&self, id: RecordId) -> Result<Option<PersistedTorrentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .get(&id)
            .map(|record| PersistedTorrentRecord {
                id,
                record: record.clone(),
            }))
    }

    async fn record_counts(&self) -> Result<HashMap<WorkerId, u64>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for record in state.records.values() {
            *counts.entry(record.worker_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_records(&self, records: &[TorrentRecord]) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        for record in records {
            staged.insert("insert_records", record)?;
        }
        *state = staged;
        Ok(())
    }

    async fn insert_record(&self, record: &TorrentRecord) -> Result<RecordId> {
        self.state.lock().await.insert("insert_record", record)
    }

    async fn update_records(&self, records: &[PersistedTorrentRecord]) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        for persisted in records {
            if staged.records.remove(&persisted.id).is_none() {
                continue;
            }
            let collides = staged.records.values().any(|existing| {
                existing.key() == persisted.record.key()
                    || (existing.worker_id == persisted.record.worker_id
                        && existing.content_hash == persisted.record.content_hash)
            });
            if collides {
                return Err(DataError::ConstraintViolation {
                    operation: "update_records",
                    constraint: "fleet_torrents_identity",
                    key: persisted.record.key().to_string(),
                });
            }
            staged.records.insert(persisted.id, persisted.record.clone());
        }
        *state = staged;
        Ok(())
    }

    async fn delete_records(&self, worker: WorkerId, content_hashes: &[String]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|_, record| {
            record.worker_id != worker || !content_hashes.contains(&record.content_hash)
        });
        Ok(u64::try_from(before - state.records.len()).unwrap_or(u64::MAX))
    }

    async fn delete_record(&self, id: RecordId) -> Result<bool> {
        Ok(self.state.lock().await.records.remove(&id).is_some())
    }

    async fn enqueue(&self, entry: &NewQueuedAddition) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.queue.values().any(|queued| queued.key == entry.key) {
            return Ok(false);
        }
        let id = state.allocate();
        state.queue.insert(
            id,
            QueuedAddition {
                id,
                key: entry.key.clone(),
                enqueued_at: Utc::now(),
                priority_delay: entry.priority_delay,
                destination_path: entry.destination_path.clone(),
            },
        );
        Ok(true)
    }

    async fn queue_head(&self) -> Result<Option<QueuedAddition>> {
        let state = self.state.lock().await;
        Ok(state
            .queue
            .values()
            .min_by(|left, right| left.serve_order(right))
            .cloned())
    }

    async fn remove_queued(&self, id: i64) -> Result<()> {
        self.state.lock().await.queue.remove(&id);
        Ok(())
    }

    async fn queue_len(&self) -> Result<u64> {
        let len = self.state.lock().await.queue.len();
        Ok(u64::try_from(len).unwrap_or(u64::MAX))
    }

    async fn upsert_tracker_torrent(&self, torrent: &TrackerTorrent) -> Result<()> {
        self.state.lock().await.tracker_torrents.insert(
            (torrent.tracker.clone(), torrent.torrent_id),
            torrent.clone(),
        );
        Ok(())
    }

    async fn tracker_torrents(&self, tracker: &str, ids: &[i64]) -> Result<Vec<TrackerTorrent>> {
        let state = self.state.lock().await;
        Ok(state
            .tracker_torrents
            .values()
            .filter(|torrent| torrent.tracker == tracker && ids.contains(&torrent.torrent_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn record(
        worker: WorkerId,
        location: LocationId,
        announce: &str,
        content: &str,
    ) -> TorrentRecord {
        TorrentRecord {
            announce_set_hash: announce.repeat(40),
            content_hash: content.repeat(40),
            worker_id: worker,
            location_id: location,
            name: format!("item-{content}"),
            size_bytes: 100,
            uploaded_bytes: 0,
            done: 0.0,
            date_added: Utc::now(),
            error: None,
            announces: "http://tracker/announce".to_string(),
        }
    }

    #[tokio::test]
    async fn bulk_insert_is_all_or_nothing() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let worker = store.add_worker("transmission", serde_json::json!({})).await;
        let location = store.add_location("/downloads", None, true).await?;

        let first = record(worker, location, "A", "1");
        let duplicate = record(worker, location, "A", "1");
        let err = store
            .insert_records(&[first.clone(), duplicate])
            .await
            .err();
        assert!(matches!(
            err,
            Some(DataError::ConstraintViolation {
                constraint: "fleet_torrents_identity",
                ..
            })
        ));
        assert!(store.records_for_worker(worker, &RecordFilter::All).await?.is_empty());

        store.insert_records(&[first]).await?;
        assert_eq!(store.records_for_worker(worker, &RecordFilter::All).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn worker_cannot_hold_one_content_twice() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let worker = store.add_worker("transmission", serde_json::json!({})).await;
        let location = store.add_location("/downloads", None, true).await?;
        store.insert_record(&record(worker, location, "A", "1")).await?;
        let err = store
            .insert_record(&record(worker, location, "B", "1"))
            .await
            .err();
        assert!(matches!(
            err,
            Some(DataError::ConstraintViolation {
                constraint: "fleet_torrents_worker_content",
                ..
            })
        ));

        let other = store.add_worker("transmission", serde_json::json!({})).await;
        store.insert_record(&record(other, location, "B", "1")).await?;
        let shared = store.records_by_content_hashes(&["1".repeat(40)]).await?;
        assert_eq!(shared.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn only_one_primary_location() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        store.add_location("/downloads", None, true).await?;
        let err = store.add_location("/other", None, true).await.err();
        assert!(matches!(
            err,
            Some(DataError::ConstraintViolation {
                constraint: "fleet_locations_single_primary",
                ..
            })
        ));
        store.add_location("/what", Some("what.cd"), false).await?;
        let primary = store.primary_location().await?;
        assert_eq!(primary.map(|location| location.path), Some("/downloads".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn filters_and_counts() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let worker = store.add_worker("transmission", serde_json::json!({})).await;
        let idle = store.add_worker("transmission", serde_json::json!({})).await;
        let location = store.add_location("/downloads", None, true).await?;
        let mut complete = record(worker, location, "A", "1");
        complete.done = 1.0;
        store
            .insert_records(&[complete, record(worker, location, "A", "2")])
            .await?;

        let incomplete = store
            .records_for_worker(worker, &RecordFilter::Incomplete)
            .await?;
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].record.content_hash, "2".repeat(40));

        let by_hash = store
            .records_for_worker(worker, &RecordFilter::ContentHashes(vec!["1".repeat(40)]))
            .await?;
        assert_eq!(by_hash.len(), 1);

        let counts = store.record_counts().await?;
        assert_eq!(counts.get(&worker), Some(&2));
        assert_eq!(counts.get(&idle), None);

        assert_eq!(store.delete_records(worker, &["1".repeat(40)]).await?, 1);
        assert!(store.delete_record(incomplete[0].id).await?);
        assert!(!store.delete_record(incomplete[0].id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn update_overwrites_fields() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let worker = store.add_worker("transmission", serde_json::json!({})).await;
        let location = store.add_location("/downloads", None, true).await?;
        let id = store.insert_record(&record(worker, location, "A", "1")).await?;
        let mut persisted = store.record(id).await?.ok_or("missing record")?;
        persisted.record.done = 0.75;
        persisted.record.uploaded_bytes = 42;
        store.update_records(&[persisted]).await?;
        let reloaded = store.record(id).await?.ok_or("missing record")?;
        assert!((reloaded.record.done - 0.75).abs() < f64::EPSILON);
        assert_eq!(reloaded.record.uploaded_bytes, 42);
        Ok(())
    }

    #[tokio::test]
    async fn queue_deduplicates_and_serves_in_order() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let key = |content: &str| RecordKey {
            announce_set_hash: "A".repeat(40),
            content_hash: content.repeat(40),
        };
        let entry = |content: &str, delay| NewQueuedAddition {
            key: key(content),
            priority_delay: delay,
            destination_path: "/downloads".to_string(),
        };
        assert!(store.enqueue(&entry("1", 5)).await?);
        assert!(!store.enqueue(&entry("1", 0)).await?);
        assert!(store.enqueue(&entry("2", 0)).await?);
        assert_eq!(store.queue_len().await?, 2);

        let head = store.queue_head().await?.ok_or("empty queue")?;
        assert_eq!(head.key, key("2"));
        store.remove_queued(head.id).await?;
        let head = store.queue_head().await?.ok_or("empty queue")?;
        assert_eq!(head.key, key("1"));
        Ok(())
    }

    #[tokio::test]
    async fn tracker_mappings_upsert() -> std::result::Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let mapping = |content: &str| TrackerTorrent {
            tracker: "what.cd".to_string(),
            torrent_id: 7,
            key: RecordKey {
                announce_set_hash: "A".repeat(40),
                content_hash: content.repeat(40),
            },
            announces: "http://tracker/announce".to_string(),
            retrieved_at: Utc::now(),
        };
        store.upsert_tracker_torrent(&mapping("1")).await?;
        store.upsert_tracker_torrent(&mapping("2")).await?;
        let found = store.tracker_torrents("what.cd", &[7, 8]).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key.content_hash, "2".repeat(40));
        assert!(store.tracker_torrents("other", &[7]).await?.is_empty());
        Ok(())
    }
}
