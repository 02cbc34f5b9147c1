//! Contract implemented by every remote worker adapter.

use async_trait::async_trait;

use crate::error::FleetResult;
use crate::model::TorrentSnapshot;

/// Uniform capability over one remote torrent client daemon.
///
/// Transport and protocol failures surface as
/// [`crate::FleetError::BackendUnavailable`].
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Report the worker's torrents, optionally restricted to the given info hashes.
    async fn snapshots(&self, filter: Option<&[String]>) -> FleetResult<Vec<TorrentSnapshot>>;

    /// Hand a bencoded torrent description to the worker.
    async fn add_item(&self, bytes: &[u8], destination_path: &str) -> FleetResult<()>;

    /// Remove a torrent (and its data) from the worker.
    async fn remove_item(&self, content_hash: &str) -> FleetResult<()>;
}
