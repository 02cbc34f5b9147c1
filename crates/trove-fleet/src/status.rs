//! Download status of torrents addressed by content hash or by tracker id.

use std::collections::{BTreeMap, HashMap};

use trove_data::FleetStore;
use trove_torrent_core::{FleetResult, ItemStatus, PersistedTorrentRecord, RecordKey};

/// Which torrents to report on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQuery {
    /// Any record with one of these content hashes.
    ContentHashes(Vec<String>),
    /// Records mapped from a tracker's torrent ids.
    Tracker {
        /// Tracker name.
        tracker: String,
        /// Tracker-side torrent ids.
        ids: Vec<i64>,
    },
}

/// Status per requested key: the hash as given, or the tracker id as text.
///
/// # Errors
///
/// Returns [`trove_torrent_core::FleetError::PersistFailure`] when the store
/// cannot be read.
pub async fn lookup_status(
    store: &dyn FleetStore,
    query: &StatusQuery,
) -> FleetResult<BTreeMap<String, ItemStatus>> {
    match query {
        StatusQuery::ContentHashes(hashes) => {
            let normalized: Vec<String> = hashes.iter().map(|hash| hash.to_uppercase()).collect();
            let records = store.records_by_content_hashes(&normalized).await?;
            let mut best: HashMap<&str, &PersistedTorrentRecord> = HashMap::new();
            for persisted in &records {
                best.entry(persisted.record.content_hash.as_str())
                    .and_modify(|current| {
                        if persisted.record.done > current.record.done {
                            *current = persisted;
                        }
                    })
                    .or_insert(persisted);
            }
            Ok(hashes
                .iter()
                .zip(&normalized)
                .map(|(requested, hash)| {
                    let status = ItemStatus::from_record(best.get(hash.as_str()).copied());
                    (requested.clone(), status)
                })
                .collect())
        }
        StatusQuery::Tracker { tracker, ids } => {
            let mappings = store.tracker_torrents(tracker, ids).await?;
            let keys: Vec<RecordKey> = mappings.iter().map(|mapping| mapping.key.clone()).collect();
            let records = store.records_by_keys(&keys).await?;
            let by_key: HashMap<RecordKey, &PersistedTorrentRecord> = records
                .iter()
                .map(|persisted| (persisted.record.key(), persisted))
                .collect();
            let by_id: HashMap<i64, &RecordKey> = mappings
                .iter()
                .map(|mapping| (mapping.torrent_id, &mapping.key))
                .collect();
            Ok(ids
                .iter()
                .map(|id| {
                    let record = by_id.get(id).and_then(|key| by_key.get(*key)).copied();
                    (id.to_string(), ItemStatus::from_record(record))
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::error::Error;
    use trove_data::MemoryFleetStore;
    use trove_test_support::TorrentFixture;
    use trove_torrent_core::{ContentIdentity, TorrentRecord, TrackerTorrent};

    async fn seed(
        store: &MemoryFleetStore,
        identity: &ContentIdentity,
        done: f64,
    ) -> Result<(), Box<dyn Error>> {
        let worker = store.add_worker("fake", serde_json::Value::Null).await;
        let location = match store.locations().await?.first() {
            Some(location) => location.id,
            None => store.add_location("/downloads", None, true).await?,
        };
        store
            .insert_record(&TorrentRecord {
                announce_set_hash: identity.announce_set_hash.clone(),
                content_hash: identity.content_hash.clone(),
                worker_id: worker,
                location_id: location,
                name: "album".into(),
                size_bytes: 1,
                uploaded_bytes: 0,
                done,
                date_added: Utc::now(),
                error: None,
                announces: identity.encoded_announces()?,
            })
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn status_by_content_hash() -> Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let missing = TorrentFixture::new("missing").identity()?;
        let fresh = TorrentFixture::new("fresh").identity()?;
        let half = TorrentFixture::new("half").identity()?;
        let done = TorrentFixture::new("done").identity()?;
        seed(&store, &fresh, 0.0).await?;
        seed(&store, &half, 0.5).await?;
        seed(&store, &done, 1.0).await?;

        let query = StatusQuery::ContentHashes(vec![
            missing.content_hash.clone(),
            fresh.content_hash.to_lowercase(),
            half.content_hash.clone(),
            done.content_hash.clone(),
        ]);
        let statuses = lookup_status(&store, &query).await?;
        assert_eq!(statuses[&missing.content_hash], ItemStatus::Missing);
        assert_eq!(
            statuses[&fresh.content_hash.to_lowercase()],
            ItemStatus::Downloading { progress: 0.0 }
        );
        assert_eq!(
            statuses[&half.content_hash],
            ItemStatus::Downloading { progress: 0.5 }
        );
        assert_eq!(statuses[&done.content_hash], ItemStatus::Downloaded);
        Ok(())
    }

    #[tokio::test]
    async fn status_by_tracker_id_uses_the_exact_identity() -> Result<(), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let fixture = TorrentFixture::new("album");
        let mapped = fixture.identity()?;
        let other_announce = fixture.announce("http://other.example/announce").identity()?;
        seed(&store, &other_announce, 1.0).await?;
        store
            .upsert_tracker_torrent(&TrackerTorrent {
                tracker: "what.cd".into(),
                torrent_id: 7,
                key: mapped.key(),
                announces: mapped.encoded_announces()?,
                retrieved_at: Utc::now(),
            })
            .await?;

        let query = StatusQuery::Tracker {
            tracker: "what.cd".into(),
            ids: vec![7, 8],
        };
        let statuses = lookup_status(&store, &query).await?;
        assert_eq!(statuses["7"], ItemStatus::Missing);
        assert_eq!(statuses["8"], ItemStatus::Missing);

        seed(&store, &mapped, 1.0).await?;
        let statuses = lookup_status(&store, &query).await?;
        assert_eq!(statuses["7"], ItemStatus::Downloaded);
        Ok(())
    }
}
