//! Three-way diff between what a worker reports and what the record store holds.
//!
//! # Design
//! - The worker is authoritative; the store is corrected towards it.
//! - Records are matched by content hash within a worker. A changed announce
//!   list is an update, so the record keeps its id.
//! - Each write phase stands alone: a failed phase is reported and the
//!   others still run.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use tracing::{debug, error, info, warn};
use trove_data::{FleetStore, RecordFilter};
use trove_torrent_core::{
    DownloadLocation, FleetResult, LocationId, PersistedTorrentRecord, RecordKey, TorrentRecord,
    TorrentSnapshot, WorkerId, encode_announces, hash_announces,
};

use crate::state::WorkerHandle;

/// Which slice of a worker to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every torrent on the worker.
    Full,
    /// Torrents the store still considers incomplete.
    Incomplete,
    /// One content hash.
    Single(String),
}

impl SyncScope {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incomplete => "incomplete",
            Self::Single(_) => "single",
        }
    }
}

/// Corrective writes for one worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDiff {
    /// Torrents the store does not know yet.
    pub creates: Vec<TorrentRecord>,
    /// Known torrents whose tracked fields changed.
    pub updates: Vec<PersistedTorrentRecord>,
    /// Content hashes the worker no longer holds.
    pub deletes: Vec<String>,
}

impl RecordDiff {
    /// Whether no write is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Outcome of applying a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records inserted.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Write phases that failed (`create`, `update`, `delete`).
    pub failed_phases: Vec<&'static str>,
    /// Whether the pass was skipped because there was nothing to look at.
    pub skipped: bool,
}

impl ReconcileReport {
    /// Whether every phase succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_phases.is_empty()
    }
}

/// Write phases of a reconcile that did not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPhases(pub Vec<&'static str>);

impl Display for FailedPhases {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("reconcile write phase failed")
    }
}

impl Error for FailedPhases {}

struct Observed {
    key: RecordKey,
    announces: String,
    snapshot: TorrentSnapshot,
}

fn observe(worker: WorkerId, snapshot: TorrentSnapshot) -> Option<Observed> {
    let hashed = hash_announces(&snapshot.announce_tiers).and_then(|hash| {
        encode_announces(&snapshot.announce_tiers).map(|announces| (hash, announces))
    });
    match hashed {
        Ok((announce_set_hash, announces)) => Some(Observed {
            key: RecordKey {
                announce_set_hash,
                content_hash: snapshot.content_hash.clone(),
            },
            announces,
            snapshot,
        }),
        Err(err) => {
            warn!(
                worker_id = %worker,
                content_hash = %snapshot.content_hash,
                error = %err,
                "skipping torrent with unusable announce list"
            );
            None
        }
    }
}

fn differs(record: &TorrentRecord, observed: &Observed, location: LocationId) -> bool {
    let snapshot = &observed.snapshot;
    record.announce_set_hash != observed.key.announce_set_hash
        || record.announces != observed.announces
        || record.name != snapshot.name
        || record.size_bytes != snapshot.size_bytes
        || record.uploaded_bytes != snapshot.uploaded_bytes
        || (record.done - snapshot.done).abs() > f64::EPSILON
        || record.date_added.timestamp_micros() != snapshot.date_added.timestamp_micros()
        || record.error != snapshot.error
        || record.location_id != location
}

/// Compute the corrective writes for one worker.
///
/// Torrents whose download directory matches no location are left out of
/// creates and updates.
#[must_use]
pub fn compute_diff(
    worker: WorkerId,
    worker_truth: Vec<TorrentSnapshot>,
    local_truth: &[PersistedTorrentRecord],
    locations: &[DownloadLocation],
) -> RecordDiff {
    let by_path: HashMap<&str, LocationId> = locations
        .iter()
        .map(|location| (location.path.as_str(), location.id))
        .collect();
    let local: HashMap<&str, &PersistedTorrentRecord> = local_truth
        .iter()
        .map(|persisted| (persisted.record.content_hash.as_str(), persisted))
        .collect();

    let mut diff = RecordDiff::default();
    let mut seen = HashSet::new();
    for observed in worker_truth
        .into_iter()
        .filter_map(|snapshot| observe(worker, snapshot))
    {
        seen.insert(observed.key.content_hash.clone());
        let Some(location_id) = by_path.get(observed.snapshot.location_path.as_str()).copied()
        else {
            debug!(
                worker_id = %worker,
                key = %observed.key,
                path = %observed.snapshot.location_path,
                "no download location matches torrent directory"
            );
            continue;
        };
        match local.get(observed.key.content_hash.as_str()) {
            Some(existing) if differs(&existing.record, &observed, location_id) => {
                diff.updates.push(PersistedTorrentRecord {
                    id: existing.id,
                    record: to_record(worker, location_id, observed),
                });
            }
            Some(_) => {}
            None => diff.creates.push(to_record(worker, location_id, observed)),
        }
    }
    diff.deletes = local_truth
        .iter()
        .filter(|persisted| !seen.contains(&persisted.record.content_hash))
        .map(|persisted| persisted.record.content_hash.clone())
        .collect();
    diff
}

fn to_record(worker: WorkerId, location_id: LocationId, observed: Observed) -> TorrentRecord {
    let Observed {
        key,
        announces,
        snapshot,
    } = observed;
    TorrentRecord {
        announce_set_hash: key.announce_set_hash,
        content_hash: key.content_hash,
        worker_id: worker,
        location_id,
        name: snapshot.name,
        size_bytes: snapshot.size_bytes,
        uploaded_bytes: snapshot.uploaded_bytes,
        done: snapshot.done,
        date_added: snapshot.date_added,
        error: snapshot.error,
        announces,
    }
}

/// Write a diff to the store.
///
/// Creates go in as one batch; if the batch fails they are retried one row
/// at a time and the first failing row stops the rest.
pub async fn apply_diff(
    store: &dyn FleetStore,
    worker: WorkerId,
    diff: RecordDiff,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    if !diff.deletes.is_empty() {
        match store.delete_records(worker, &diff.deletes).await {
            Ok(count) => report.deleted = usize::try_from(count).unwrap_or(usize::MAX),
            Err(err) => {
                error!(worker_id = %worker, error = %err, "failed to delete torrent records");
                report.failed_phases.push("delete");
            }
        }
    }

    if !diff.updates.is_empty() {
        match store.update_records(&diff.updates).await {
            Ok(()) => report.updated = diff.updates.len(),
            Err(err) => {
                error!(worker_id = %worker, error = %err, "failed to update torrent records");
                report.failed_phases.push("update");
            }
        }
    }

    if !diff.creates.is_empty() {
        match store.insert_records(&diff.creates).await {
            Ok(()) => report.created = diff.creates.len(),
            Err(err) => {
                warn!(
                    worker_id = %worker,
                    error = %err,
                    "bulk insert failed, inserting rows one by one"
                );
                for record in &diff.creates {
                    if let Err(err) = store.insert_record(record).await {
                        error!(
                            worker_id = %worker,
                            announce_set_hash = %record.announce_set_hash,
                            content_hash = %record.content_hash,
                            name = %record.name,
                            error = %err,
                            "failed to insert torrent record"
                        );
                        report.failed_phases.push("create");
                        break;
                    }
                    report.created += 1;
                }
            }
        }
    }

    report
}

/// Pull the worker's truth for `scope` and correct the store.
///
/// The caller must hold the worker's lock.
///
/// # Errors
///
/// Returns an error when the worker or the store cannot be read. Write
/// failures are reported in [`ReconcileReport::failed_phases`].
pub async fn reconcile(
    store: &dyn FleetStore,
    worker: &WorkerHandle,
    scope: &SyncScope,
) -> FleetResult<ReconcileReport> {
    let id = worker.id();
    let (local, truth) = match scope {
        SyncScope::Full => {
            let local = store.records_for_worker(id, &RecordFilter::All).await?;
            (local, worker.backend.snapshots(None).await?)
        }
        SyncScope::Incomplete => {
            let local = store
                .records_for_worker(id, &RecordFilter::Incomplete)
                .await?;
            if local.is_empty() {
                return Ok(ReconcileReport {
                    skipped: true,
                    ..ReconcileReport::default()
                });
            }
            let hashes: Vec<String> = local
                .iter()
                .map(|persisted| persisted.record.content_hash.clone())
                .collect();
            (local, worker.backend.snapshots(Some(&hashes)).await?)
        }
        SyncScope::Single(content_hash) => {
            let hashes = vec![content_hash.clone()];
            let local = store
                .records_for_worker(id, &RecordFilter::ContentHashes(hashes.clone()))
                .await?;
            (local, worker.backend.snapshots(Some(&hashes)).await?)
        }
    };
    let locations = store.locations().await?;

    let diff = compute_diff(id, truth, &local, &locations);
    let report = apply_diff(store, id, diff).await;
    if report.created + report.updated + report.deleted > 0 {
        info!(
            worker_id = %id,
            scope = scope.label(),
            "{} new, {} changed, {} deleted",
            report.created,
            report.updated,
            report.deleted
        );
    }
    Ok(report)
}
