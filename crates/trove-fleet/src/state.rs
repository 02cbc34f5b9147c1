//! Worker arena plus one exclusive lock per worker, built once at startup.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use trove_data::FleetStore;
use trove_torrent_core::{FleetError, FleetResult, WorkerBackend, WorkerId, WorkerInstance};

use crate::registry::BackendRegistry;

/// A configured worker and its adapter.
#[derive(Clone)]
pub struct WorkerHandle {
    /// Persisted worker configuration.
    pub instance: WorkerInstance,
    /// Adapter talking to the worker.
    pub backend: Arc<dyn WorkerBackend>,
}

impl WorkerHandle {
    /// Worker identifier.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.instance.id
    }
}

/// Registry of workers with their locks. Fixed for the process lifetime.
pub struct FleetState {
    workers: BTreeMap<WorkerId, WorkerHandle>,
    locks: HashMap<WorkerId, Arc<Mutex<()>>>,
}

impl FleetState {
    /// Build the fleet from the persisted workers.
    ///
    /// # Errors
    ///
    /// Fails on the first worker whose backend tag is unknown or whose
    /// adapter cannot be built, and when the workers cannot be loaded.
    pub async fn load(store: &dyn FleetStore, registry: &BackendRegistry) -> FleetResult<Self> {
        let instances = store.workers().await?;
        let mut handles = Vec::with_capacity(instances.len());
        for instance in instances {
            let backend = registry.build(&instance)?;
            handles.push(WorkerHandle { instance, backend });
        }
        info!(workers = handles.len(), "fleet state loaded");
        Ok(Self::from_handles(handles))
    }

    /// Build the fleet from ready-made handles.
    #[must_use]
    pub fn from_handles(handles: Vec<WorkerHandle>) -> Self {
        let workers: BTreeMap<WorkerId, WorkerHandle> = handles
            .into_iter()
            .map(|handle| (handle.id(), handle))
            .collect();
        let locks = workers
            .keys()
            .map(|id| (*id, Arc::new(Mutex::new(()))))
            .collect();
        Self { workers, locks }
    }

    /// A worker by id.
    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(&id)
    }

    /// A worker by id, or [`FleetError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error when the worker is not part of the fleet.
    pub fn require(&self, id: WorkerId) -> FleetResult<&WorkerHandle> {
        self.worker(id)
            .ok_or_else(|| FleetError::not_found("worker", id.to_string()))
    }

    /// Worker ids in ascending order.
    #[must_use]
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the fleet has no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers whose lock is held right now.
    ///
    /// A hint only: the answer may be stale by the time it is used.
    #[must_use]
    pub fn locked_workers(&self) -> HashSet<WorkerId> {
        self.locks
            .iter()
            .filter(|(_, lock)| lock.try_lock().is_err())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Take a worker's exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] for an unknown worker.
    pub async fn lock(&self, id: WorkerId) -> FleetResult<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .get(&id)
            .ok_or_else(|| FleetError::not_found("worker", id.to_string()))?;
        Ok(Arc::clone(lock).lock_owned().await)
    }
}
