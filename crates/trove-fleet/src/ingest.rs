//! Fetch torrents from a tracker into the content store and admission queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use trove_data::FleetStore;
use trove_store::ContentStore;
use trove_telemetry::Metrics;
use trove_torrent_core::{FleetError, FleetResult, NewQueuedAddition, TrackerTorrent};
use trove_tracker::{MetadataClient, TrackerResult};

/// Queue priority given to tracker downloads.
pub const INGEST_PRIORITY_DELAY: i32 = 0;

/// Tracker downloads keyed by tracker name.
pub struct TrackerIngest {
    clients: BTreeMap<String, Arc<MetadataClient>>,
    store: Arc<dyn FleetStore>,
    content: ContentStore,
    metrics: Metrics,
}

impl TrackerIngest {
    /// Ingest pipeline without trackers.
    #[must_use]
    pub const fn new(store: Arc<dyn FleetStore>, content: ContentStore, metrics: Metrics) -> Self {
        Self {
            clients: BTreeMap::new(),
            store,
            content,
            metrics,
        }
    }

    /// Register the client for a tracker name.
    #[must_use]
    pub fn with_tracker(mut self, name: impl Into<String>, client: Arc<MetadataClient>) -> Self {
        self.clients.insert(name.into(), client);
        self
    }

    /// Names of the configured trackers.
    pub fn trackers(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Download `torrent_id` from `tracker`, store it, map it, and queue it
    /// for placement under `<primary location>/<torrent_id>`.
    ///
    /// # Errors
    ///
    /// - [`FleetError::NotFound`] for an unknown tracker or a missing primary location.
    /// - Tracker, content store, and record store failures.
    pub async fn fetch(&self, tracker: &str, torrent_id: i64) -> FleetResult<TrackerTorrent> {
        let client = self
            .clients
            .get(tracker)
            .ok_or_else(|| FleetError::not_found("tracker", tracker))?;
        let primary = self
            .store
            .primary_location()
            .await?
            .ok_or_else(|| FleetError::not_found("location", "primary"))?;

        let id = torrent_id.to_string();
        let metadata = self.observe(client.call_with_retry("torrent", &[("id", &id)]).await)?;
        let (filename, bytes) = self.observe(client.download_torrent(torrent_id).await)?;

        let identity = self.content.put(&bytes).await?;
        let mapping = TrackerTorrent {
            tracker: tracker.to_string(),
            torrent_id,
            key: identity.key(),
            announces: identity.encoded_announces()?,
            retrieved_at: Utc::now(),
        };
        self.store.upsert_tracker_torrent(&mapping).await?;

        let destination_path = format!("{}/{torrent_id}", primary.path.trim_end_matches('/'));
        let queued = self
            .store
            .enqueue(&NewQueuedAddition {
                key: identity.key(),
                priority_delay: INGEST_PRIORITY_DELAY,
                destination_path,
            })
            .await?;
        let group = metadata
            .pointer("/group/name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        info!(
            tracker,
            torrent_id,
            filename = %filename,
            group,
            key = %mapping.key,
            queued,
            "tracker torrent ingested"
        );
        Ok(mapping)
    }

    fn observe<T>(&self, result: TrackerResult<T>) -> FleetResult<T> {
        match result {
            Ok(value) => {
                self.metrics.inc_tracker_request("success");
                Ok(value)
            }
            Err(err) => {
                let err = FleetError::from(err);
                self.metrics.inc_tracker_request(err.error_code());
                Err(err)
            }
        }
    }
}
