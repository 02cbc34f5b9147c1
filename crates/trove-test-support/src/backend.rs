//! In-memory [`WorkerBackend`] that records every call.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use trove_torrent_core::bencode::{self, Value};
use trove_torrent_core::{
    FleetError, FleetResult, TorrentSnapshot, WorkerBackend, derive_identity,
};

/// Build a snapshot with sensible defaults.
#[must_use]
pub fn snapshot(content_hash: &str, name: &str, location_path: &str) -> TorrentSnapshot {
    TorrentSnapshot {
        content_hash: content_hash.to_string(),
        name: name.to_string(),
        size_bytes: 1_048_576,
        uploaded_bytes: 0,
        done: 0.0,
        date_added: Utc::now(),
        error: None,
        location_path: location_path.to_string(),
        announce_tiers: vec![vec!["http://tracker.example/announce".to_string()]],
    }
}

/// Item handed to the fake worker through `add_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedItem {
    /// Info hash of the added description.
    pub content_hash: String,
    /// Destination path passed by the caller.
    pub destination_path: String,
}

/// Fake worker keeping its torrents in memory.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    torrents: Mutex<Vec<TorrentSnapshot>>,
    added: Mutex<Vec<AddedItem>>,
    removed: Mutex<Vec<String>>,
    unavailable: AtomicBool,
    snapshot_calls: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Offline;

impl std::fmt::Display for Offline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("worker offline")
    }
}

impl std::error::Error for Offline {}

impl RecordingBackend {
    /// Empty worker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker that already holds the given torrents.
    #[must_use]
    pub fn with_snapshots(snapshots: Vec<TorrentSnapshot>) -> Self {
        let backend = Self::default();
        *guard(&backend.torrents) = snapshots;
        backend
    }

    /// Add or replace a torrent in the worker.
    pub fn upsert(&self, snapshot: TorrentSnapshot) {
        let mut torrents = guard(&self.torrents);
        torrents.retain(|existing| existing.content_hash != snapshot.content_hash);
        torrents.push(snapshot);
    }

    /// Drop a torrent without going through `remove_item`.
    pub fn forget(&self, content_hash: &str) {
        guard(&self.torrents).retain(|existing| existing.content_hash != content_hash);
    }

    /// Adjust a held torrent in place.
    pub fn update(&self, content_hash: &str, change: impl FnOnce(&mut TorrentSnapshot)) {
        if let Some(found) = guard(&self.torrents)
            .iter_mut()
            .find(|existing| existing.content_hash == content_hash)
        {
            change(found);
        }
    }

    /// Make every call fail with [`FleetError::BackendUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Items received through `add_item`, in call order.
    #[must_use]
    pub fn added(&self) -> Vec<AddedItem> {
        guard(&self.added).clone()
    }

    /// Content hashes received through `remove_item`, in call order.
    #[must_use]
    pub fn removed(&self) -> Vec<String> {
        guard(&self.removed).clone()
    }

    /// Torrents currently held.
    #[must_use]
    pub fn held(&self) -> Vec<TorrentSnapshot> {
        guard(&self.torrents).clone()
    }

    /// Number of `snapshots` calls served.
    #[must_use]
    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &'static str) -> FleetResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FleetError::backend(operation, Offline));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerBackend for RecordingBackend {
    async fn snapshots(&self, filter: Option<&[String]>) -> FleetResult<Vec<TorrentSnapshot>> {
        self.check("snapshots")?;
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let torrents = guard(&self.torrents);
        Ok(torrents
            .iter()
            .filter(|snapshot| filter.is_none_or(|hashes| hashes.contains(&snapshot.content_hash)))
            .cloned()
            .collect())
    }

    async fn add_item(&self, bytes: &[u8], destination_path: &str) -> FleetResult<()> {
        self.check("add_item")?;
        let identity = derive_identity(bytes)?;
        let document = bencode::decode(bytes)?;
        let info = document.get("info");
        let name = info
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let size = info
            .and_then(|info| info.get("length"))
            .and_then(Value::as_integer)
            .and_then(|length| u64::try_from(length).ok())
            .unwrap_or_default();
        let location_path = Path::new(destination_path)
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();

        guard(&self.added).push(AddedItem {
            content_hash: identity.content_hash.clone(),
            destination_path: destination_path.to_string(),
        });
        self.upsert(TorrentSnapshot {
            content_hash: identity.content_hash,
            name,
            size_bytes: size,
            uploaded_bytes: 0,
            done: 0.0,
            date_added: Utc::now(),
            error: None,
            location_path,
            announce_tiers: identity.announce_tiers,
        });
        Ok(())
    }

    async fn remove_item(&self, content_hash: &str) -> FleetResult<()> {
        self.check("remove_item")?;
        guard(&self.removed).push(content_hash.to_string());
        self.forget(content_hash);
        Ok(())
    }
}
