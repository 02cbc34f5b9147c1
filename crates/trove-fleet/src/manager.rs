//! Top-level orchestration: add/delete operations and the periodic loops.
//!
//! # Design
//! - A worker's lock is held for every mutating call against it.
//! - Interactive work (add, delete, partial sync) and update work (full sync)
//!   draw from separate semaphores.
//! - Loops log their own failures and keep ticking until shutdown.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use trove_data::FleetStore;
use trove_store::ContentStore;
use trove_telemetry::Metrics;
use trove_torrent_core::{
    ContentIdentity, FleetError, FleetResult, RecordId, RecordKey, WorkerId, derive_identity,
};

use crate::placement::choose_worker;
use crate::reconcile::{FailedPhases, ReconcileReport, SyncScope, reconcile};
use crate::state::FleetState;

const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Loop periods and pool sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetSettings {
    /// Period of the per-worker incomplete-only sync.
    pub update_interval: Duration,
    /// Period of the full sync over every worker.
    pub full_update_interval: Duration,
    /// Period of the admission queue drain.
    pub queue_pop_interval: Duration,
    /// Concurrent full-sync passes.
    pub update_pool_size: usize,
    /// Concurrent interactive operations.
    pub interactive_pool_size: usize,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(3),
            full_update_interval: Duration::from_secs(30),
            queue_pop_interval: Duration::from_secs(30),
            update_pool_size: 1,
            interactive_pool_size: 2,
        }
    }
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedItem {
    /// Worker that received the torrent.
    pub worker_id: WorkerId,
    /// Identity of the placed torrent.
    pub identity: ContentIdentity,
}

/// Marks an identity as being placed until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<RecordKey>>,
    key: RecordKey,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<RecordKey>>, key: RecordKey) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then_some(Self { set, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Owns the fleet's operations and background loops.
pub struct FleetManager {
    pub(crate) store: Arc<dyn FleetStore>,
    pub(crate) state: Arc<FleetState>,
    pub(crate) content: ContentStore,
    pub(crate) metrics: Metrics,
    settings: FleetSettings,
    update_pool: Semaphore,
    interactive_pool: Semaphore,
    in_flight: Mutex<HashSet<RecordKey>>,
}

async fn permit<'a>(
    pool: &'a Semaphore,
    operation: &'static str,
) -> FleetResult<SemaphorePermit<'a>> {
    pool.acquire()
        .await
        .map_err(|err| FleetError::request(operation, err.to_string()))
}

impl FleetManager {
    /// Assemble a manager over a loaded fleet.
    #[must_use]
    pub fn new(
        store: Arc<dyn FleetStore>,
        state: Arc<FleetState>,
        content: ContentStore,
        metrics: Metrics,
        settings: FleetSettings,
    ) -> Self {
        let update_pool = Semaphore::new(settings.update_pool_size.max(1));
        let interactive_pool = Semaphore::new(settings.interactive_pool_size.max(1));
        Self {
            store,
            state,
            content,
            metrics,
            settings,
            update_pool,
            interactive_pool,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Record store used by the manager.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn FleetStore> {
        &self.store
    }

    /// The worker registry.
    #[must_use]
    pub fn state(&self) -> &Arc<FleetState> {
        &self.state
    }

    /// Content store backing the admission queue.
    #[must_use]
    pub const fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Loop periods and pool sizes.
    #[must_use]
    pub const fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    /// Place a torrent on a worker and persist its record.
    ///
    /// # Errors
    ///
    /// - [`FleetError::MalformedBinaryData`] for undecodable bytes.
    /// - [`FleetError::AlreadyPlaced`] when the identity is placed or being placed.
    /// - [`FleetError::NotFound`] when the worker files the torrent under a
    ///   directory that matches no download location.
    /// - [`FleetError::PersistFailure`] when the record could not be written.
    /// - Placement failures from [`choose_worker`], and adapter or store errors.
    pub async fn add_item(&self, bytes: &[u8], destination_path: &str) -> FleetResult<AddedItem> {
        let result = self.place(bytes, destination_path).await;
        let outcome = match &result {
            Ok(_) => "placed",
            Err(err) => err.error_code(),
        };
        self.metrics.inc_placement(outcome);
        result
    }

    async fn place(&self, bytes: &[u8], destination_path: &str) -> FleetResult<AddedItem> {
        let identity = derive_identity(bytes)?;
        let Some(_in_flight) = InFlight::claim(&self.in_flight, identity.key()) else {
            return Err(FleetError::AlreadyPlaced {
                content_hash: identity.content_hash,
                worker_id: None,
            });
        };
        let hint = self.state.locked_workers();
        self.metrics.set_workers_locked(hint.len());

        let _permit = permit(&self.interactive_pool, "add_item").await?;
        let worker_id = choose_worker(self.store.as_ref(), &self.state, &hint, &identity).await?;
        let worker = self.state.require(worker_id)?;

        let _lock = self.state.lock(worker_id).await?;
        worker.backend.add_item(bytes, destination_path).await?;
        let scope = SyncScope::Single(identity.content_hash.clone());
        let report = reconcile(self.store.as_ref(), worker, &scope).await?;
        self.observe(&scope, &report);
        if !report.is_clean() {
            return Err(FleetError::persist("add_item", FailedPhases(report.failed_phases)));
        }
        if self
            .store
            .records_by_keys(&[identity.key()])
            .await?
            .is_empty()
        {
            warn!(
                worker_id = %worker_id,
                key = %identity.key(),
                destination = destination_path,
                "placed torrent has no record; its directory matches no download location"
            );
            return Err(FleetError::not_found("download location", destination_path));
        }

        info!(
            worker_id = %worker_id,
            key = %identity.key(),
            destination = destination_path,
            "torrent placed"
        );
        Ok(AddedItem {
            worker_id,
            identity,
        })
    }

    /// Remove a torrent from its worker and drop its record.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] when the record is absent before or
    /// after taking the worker's lock, and adapter or store errors otherwise.
    pub async fn delete_item(&self, id: RecordId) -> FleetResult<()> {
        let _permit = permit(&self.interactive_pool, "delete_item").await?;
        let found = self
            .store
            .record(id)
            .await?
            .ok_or_else(|| FleetError::not_found("torrent", id.to_string()))?;
        let worker_id = found.record.worker_id;
        let worker = self.state.require(worker_id)?;

        let _lock = self.state.lock(worker_id).await?;
        let Some(current) = self.store.record(id).await? else {
            debug!(record_id = %id, "record vanished while waiting for the worker lock");
            return Err(FleetError::not_found("torrent", id.to_string()));
        };
        worker
            .backend
            .remove_item(&current.record.content_hash)
            .await?;
        self.store.delete_record(id).await?;
        info!(
            worker_id = %worker_id,
            key = %current.record.key(),
            "torrent deleted"
        );
        Ok(())
    }

    /// Reconcile one worker under its lock.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker is unknown or cannot be read.
    pub async fn sync_worker(
        &self,
        worker_id: WorkerId,
        scope: &SyncScope,
    ) -> FleetResult<ReconcileReport> {
        let pool = if matches!(scope, SyncScope::Full) {
            &self.update_pool
        } else {
            &self.interactive_pool
        };
        let _permit = permit(pool, "sync_worker").await?;
        let worker = self.state.require(worker_id)?;
        let _lock = self.state.lock(worker_id).await?;
        match reconcile(self.store.as_ref(), worker, scope).await {
            Ok(report) => {
                self.observe(scope, &report);
                Ok(report)
            }
            Err(err) => {
                self.metrics.inc_reconcile(scope.label(), "error");
                Err(err)
            }
        }
    }

    /// Full reconcile of every worker, one after another.
    ///
    /// Returns the number of workers that could not be reconciled.
    pub async fn sync_all(&self) -> usize {
        let mut failures = 0;
        for worker_id in self.state.worker_ids() {
            if let Err(err) = self.sync_worker(worker_id, &SyncScope::Full).await {
                warn!(worker_id = %worker_id, error = %err, "full sync failed");
                failures += 1;
            }
        }
        failures
    }

    fn observe(&self, scope: &SyncScope, report: &ReconcileReport) {
        if report.skipped {
            return;
        }
        let outcome = if report.is_clean() { "ok" } else { "partial" };
        self.metrics.inc_reconcile(scope.label(), outcome);
        self.metrics.add_records_written("created", report.created);
        self.metrics.add_records_written("updated", report.updated);
        self.metrics.add_records_written("deleted", report.deleted);
    }

    /// Start the partial-sync loop of every worker, the full-sync loop, and
    /// the queue-drain loop. Each stops once `shutdown` turns `true` or its
    /// sender is dropped.
    #[must_use]
    pub fn spawn_loops(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.state.len() + 2);
        for worker_id in self.state.worker_ids() {
            let manager = Arc::clone(self);
            let ticker = Ticker::new(self.settings.update_interval, shutdown.clone());
            handles.push(tokio::spawn(manager.partial_sync_loop(worker_id, ticker)));
        }
        let manager = Arc::clone(self);
        let ticker = Ticker::new(self.settings.full_update_interval, shutdown.clone());
        handles.push(tokio::spawn(manager.full_sync_loop(ticker)));
        let manager = Arc::clone(self);
        let ticker = Ticker::new(self.settings.queue_pop_interval, shutdown.clone());
        handles.push(tokio::spawn(manager.queue_drain_loop(ticker)));
        handles
    }

    async fn partial_sync_loop(self: Arc<Self>, worker_id: WorkerId, mut ticker: Ticker) {
        while ticker.next().await {
            if let Err(err) = self.sync_worker(worker_id, &SyncScope::Incomplete).await {
                warn!(worker_id = %worker_id, error = %err, "partial sync failed");
            }
        }
        debug!(worker_id = %worker_id, "partial sync loop stopped");
    }

    async fn full_sync_loop(self: Arc<Self>, mut ticker: Ticker) {
        while ticker.next().await {
            let failures = self.sync_all().await;
            debug!(failures, "full sync pass finished");
        }
        debug!("full sync loop stopped");
    }

    async fn queue_drain_loop(self: Arc<Self>, mut ticker: Ticker) {
        while ticker.next().await {
            match self.drain_one().await {
                Ok(outcome) => debug!(?outcome, "queue drain tick"),
                Err(err) => warn!(error = %err, "queue drain failed"),
            }
            match self.store.queue_len().await {
                Ok(depth) => self.metrics.set_queue_depth(depth),
                Err(err) => warn!(error = %err, "failed to read queue depth"),
            }
        }
        debug!("queue drain loop stopped");
    }
}

/// Interval that also watches the shutdown flag.
struct Ticker {
    interval: Interval,
    shutdown: watch::Receiver<bool>,
}

impl Ticker {
    fn new(period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = interval(period.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, shutdown }
    }

    /// Wait for the next tick; `false` once shutdown was requested.
    async fn next(&mut self) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }
        loop {
            tokio::select! {
                _ = self.interval.tick() => return true,
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}
