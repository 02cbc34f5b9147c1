//! Worker selection for a new torrent.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use tracing::debug;
use trove_data::FleetStore;
use trove_torrent_core::{ContentIdentity, FleetError, FleetResult, WorkerId};

use crate::state::FleetState;

/// Pick the worker that should receive `identity`.
///
/// Workers already holding the content hash are never chosen. The remaining
/// workers are ranked least-loaded first; the first one not in `locked_hint`
/// wins, and if every candidate is hinted a random candidate is returned.
///
/// # Errors
///
/// - [`FleetError::AlreadyPlaced`] when the exact identity is persisted.
/// - [`FleetError::NoEligibleWorker`] when every worker holds the content
///   hash under another announce set.
/// - [`FleetError::NoWorkersConfigured`] when the fleet is empty.
pub async fn choose_worker(
    store: &dyn FleetStore,
    state: &FleetState,
    locked_hint: &HashSet<WorkerId>,
    identity: &ContentIdentity,
) -> FleetResult<WorkerId> {
    let holders = store
        .records_by_content_hashes(std::slice::from_ref(&identity.content_hash))
        .await?;
    if let Some(existing) = holders
        .iter()
        .find(|persisted| persisted.record.announce_set_hash == identity.announce_set_hash)
    {
        return Err(FleetError::AlreadyPlaced {
            content_hash: identity.content_hash.clone(),
            worker_id: Some(existing.record.worker_id),
        });
    }
    let excluded: HashSet<WorkerId> = holders
        .iter()
        .map(|persisted| persisted.record.worker_id)
        .collect();

    let counts = store.record_counts().await?;
    let mut candidates: Vec<(u64, WorkerId)> = state
        .worker_ids()
        .into_iter()
        .filter(|id| !excluded.contains(id))
        .map(|id| (counts.get(&id).copied().unwrap_or(0), id))
        .collect();
    candidates.sort_unstable();

    if candidates.is_empty() {
        return Err(if excluded.is_empty() {
            FleetError::NoWorkersConfigured
        } else {
            FleetError::NoEligibleWorker {
                content_hash: identity.content_hash.clone(),
                excluded: excluded.len(),
            }
        });
    }

    if let Some((load, id)) = candidates
        .iter()
        .find(|(_, id)| !locked_hint.contains(id))
    {
        debug!(worker_id = %id, load, "placing on least-loaded idle worker");
        return Ok(*id);
    }
    let (_, id) = candidates
        .choose(&mut rand::rng())
        .copied()
        .ok_or(FleetError::NoWorkersConfigured)?;
    debug!(worker_id = %id, "every candidate is busy, placing at random");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::sync::Arc;
    use trove_data::MemoryFleetStore;
    use trove_test_support::{RecordingBackend, TorrentFixture};
    use trove_torrent_core::{LocationId, PersistedTorrentRecord, TorrentRecord, WorkerInstance};

    use crate::state::WorkerHandle;

    async fn fleet(
        workers: usize,
    ) -> Result<(MemoryFleetStore, FleetState, Vec<WorkerId>, LocationId), Box<dyn Error>> {
        let store = MemoryFleetStore::new();
        let location = store.add_location("/downloads", None, true).await?;
        let mut handles = Vec::new();
        for _ in 0..workers {
            let id = store.add_worker("fake", serde_json::Value::Null).await;
            handles.push(WorkerHandle {
                instance: WorkerInstance {
                    id,
                    backend: "fake".into(),
                    params: serde_json::Value::Null,
                },
                backend: Arc::new(RecordingBackend::new()),
            });
        }
        let ids = handles.iter().map(WorkerHandle::id).collect();
        Ok((store, FleetState::from_handles(handles), ids, location))
    }

    fn record(identity: &ContentIdentity, worker: WorkerId, location: LocationId) -> TorrentRecord {
        TorrentRecord {
            announce_set_hash: identity.announce_set_hash.clone(),
            content_hash: identity.content_hash.clone(),
            worker_id: worker,
            location_id: location,
            name: "album".into(),
            size_bytes: 1,
            uploaded_bytes: 0,
            done: 0.0,
            date_added: chrono::Utc::now(),
            error: None,
            announces: identity.encoded_announces().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn empty_fleet_has_no_workers() -> Result<(), Box<dyn Error>> {
        let (store, state, _, _) = fleet(0).await?;
        let identity = TorrentFixture::new("album").identity()?;
        assert!(matches!(
            choose_worker(&store, &state, &HashSet::new(), &identity).await,
            Err(FleetError::NoWorkersConfigured)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn single_worker_is_chosen() -> Result<(), Box<dyn Error>> {
        let (store, state, ids, _) = fleet(1).await?;
        let identity = TorrentFixture::new("album").identity()?;
        assert_eq!(
            choose_worker(&store, &state, &HashSet::new(), &identity).await?,
            ids[0]
        );
        Ok(())
    }

    #[tokio::test]
    async fn hints_steer_between_two_workers() -> Result<(), Box<dyn Error>> {
        let (store, state, ids, _) = fleet(2).await?;
        let (a, b) = (ids[0], ids[1]);
        let identity = TorrentFixture::new("album").identity()?;

        let chosen = choose_worker(&store, &state, &HashSet::from([a]), &identity).await?;
        assert_eq!(chosen, b);
        let chosen = choose_worker(&store, &state, &HashSet::from([b]), &identity).await?;
        assert_eq!(chosen, a);
        let chosen = choose_worker(&store, &state, &HashSet::new(), &identity).await?;
        assert!(chosen == a || chosen == b);
        let chosen = choose_worker(&store, &state, &HashSet::from([a, b]), &identity).await?;
        assert!(chosen == a || chosen == b);
        Ok(())
    }

    #[tokio::test]
    async fn least_loaded_worker_wins() -> Result<(), Box<dyn Error>> {
        let (store, state, ids, location) = fleet(2).await?;
        let other = TorrentFixture::new("other").identity()?;
        store.insert_record(&record(&other, ids[0], location)).await?;

        let identity = TorrentFixture::new("album").identity()?;
        assert_eq!(
            choose_worker(&store, &state, &HashSet::new(), &identity).await?,
            ids[1]
        );
        Ok(())
    }

    #[tokio::test]
    async fn announce_swap_excludes_the_holder() -> Result<(), Box<dyn Error>> {
        let (store, state, ids, location) = fleet(2).await?;
        let (a, b) = (ids[0], ids[1]);
        let fixture = TorrentFixture::new("album");
        let identity = fixture.identity()?;
        let id = store.insert_record(&record(&identity, a, location)).await?;

        for hint in [HashSet::new(), HashSet::from([a]), HashSet::from([b])] {
            assert!(matches!(
                choose_worker(&store, &state, &hint, &identity).await,
                Err(FleetError::AlreadyPlaced { worker_id: Some(holder), .. }) if holder == a
            ));
        }

        let swapped = fixture.announce("http://other.example/announce").identity()?;
        assert_eq!(swapped.content_hash, identity.content_hash);
        assert_ne!(swapped.announce_set_hash, identity.announce_set_hash);
        store
            .update_records(&[PersistedTorrentRecord {
                id,
                record: record(&swapped, a, location),
            }])
            .await?;

        for _ in 0..20 {
            assert_eq!(choose_worker(&store, &state, &HashSet::new(), &identity).await?, b);
            assert_eq!(
                choose_worker(&store, &state, &HashSet::from([a, b]), &identity).await?,
                b
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn every_holder_excluded_is_not_exhaustion() -> Result<(), Box<dyn Error>> {
        let (store, state, ids, location) = fleet(1).await?;
        let fixture = TorrentFixture::new("album");
        let held = fixture.clone().announce("http://other.example/announce").identity()?;
        store.insert_record(&record(&held, ids[0], location)).await?;

        let err = choose_worker(&store, &state, &HashSet::new(), &fixture.identity()?)
            .await
            .err();
        assert!(matches!(
            err,
            Some(FleetError::NoEligibleWorker { excluded: 1, .. })
        ));
        Ok(())
    }
}
