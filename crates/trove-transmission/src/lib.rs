#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Transmission adapter for the fleet's worker backend contract.

mod convert;
pub mod error;
/// JSON-RPC transport with session-id negotiation.
pub mod rpc;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use trove_torrent_core::{FleetError, FleetResult, TorrentSnapshot, WorkerBackend, WorkerInstance};
use url::Url;

pub use error::TransmissionError;
pub use rpc::RpcClient;

/// Backend tag stored on worker rows served by this adapter.
pub const BACKEND_TAG: &str = "transmission";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const TORRENT_FIELDS: [&str; 10] = [
    "name",
    "hashString",
    "totalSize",
    "uploadedEver",
    "percentDone",
    "addedDate",
    "error",
    "errorString",
    "downloadDir",
    "trackers",
];

/// Connection parameters stored with a worker instance.
#[derive(Debug, Clone, Deserialize)]
pub struct TransmissionParams {
    /// RPC endpoint, e.g. `http://host:9091/transmission/rpc`.
    pub url: String,
    /// Basic-auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Worker backend talking to one Transmission daemon.
pub struct TransmissionBackend {
    rpc: RpcClient,
}

impl TransmissionBackend {
    /// Build a backend from parsed parameters.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the HTTP client cannot be built.
    pub fn new(params: &TransmissionParams) -> Result<Self, TransmissionError> {
        let url = Url::parse(&params.url).map_err(|_| TransmissionError::InvalidParams {
            field: "url",
            reason: "not an absolute url",
        })?;
        let credentials = params
            .username
            .clone()
            .map(|username| (username, params.password.clone()));
        let timeout = Duration::from_secs(params.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Ok(Self {
            rpc: RpcClient::new(url, credentials, timeout)?,
        })
    }
}

/// Registry constructor: build a Transmission backend for a worker row.
///
/// # Errors
///
/// Returns [`FleetError::BackendUnavailable`] when the parameters are unusable.
pub fn connect(instance: &WorkerInstance) -> FleetResult<Arc<dyn WorkerBackend>> {
    let params: TransmissionParams = serde_json::from_value(instance.params.clone())
        .map_err(|source| {
            FleetError::backend("parse_params", TransmissionError::Params { source })
        })?;
    let backend =
        TransmissionBackend::new(&params).map_err(|err| FleetError::backend("connect", err))?;
    Ok(Arc::new(backend))
}

#[async_trait]
impl WorkerBackend for TransmissionBackend {
    async fn snapshots(&self, filter: Option<&[String]>) -> FleetResult<Vec<TorrentSnapshot>> {
        let mut arguments = json!({ "fields": TORRENT_FIELDS });
        if let Some(hashes) = filter {
            arguments["ids"] = json!(hashes);
        }
        let response = self
            .rpc
            .call("torrent-get", arguments)
            .await
            .map_err(|err| FleetError::backend("torrent-get", err))?;
        let snapshots = convert::snapshots(response)
            .map_err(|err| FleetError::backend("torrent-get", err))?;
        debug!(count = snapshots.len(), "fetched transmission torrents");
        Ok(snapshots)
    }

    async fn add_item(&self, bytes: &[u8], destination_path: &str) -> FleetResult<()> {
        let arguments = json!({
            "metainfo": STANDARD.encode(bytes),
            "download-dir": destination_path,
        });
        let response = self
            .rpc
            .call("torrent-add", arguments)
            .await
            .map_err(|err| FleetError::backend("torrent-add", err))?;
        if let Some(duplicate) = response.get("torrent-duplicate") {
            let content_hash = duplicate
                .get("hashString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase();
            return Err(FleetError::AlreadyPlaced {
                content_hash,
                worker_id: None,
            });
        }
        Ok(())
    }

    async fn remove_item(&self, content_hash: &str) -> FleetResult<()> {
        let arguments = json!({
            "ids": [content_hash],
            "delete-local-data": true,
        });
        self.rpc
            .call("torrent-remove", arguments)
            .await
            .map_err(|err| FleetError::backend("torrent-remove", err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::SESSION_HEADER;
    use httpmock::prelude::*;
    use std::error::Error;
    use trove_test_support::TorrentFixture;
    use trove_torrent_core::WorkerId;

    fn backend(server: &MockServer) -> Result<TransmissionBackend, TransmissionError> {
        TransmissionBackend::new(&TransmissionParams {
            url: server.url("/transmission/rpc"),
            username: None,
            password: None,
            timeout_secs: Some(5),
        })
    }

    #[tokio::test]
    async fn snapshots_rebuild_tiers_and_location() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/transmission/rpc")
                .json_body(json!({
                    "method": "torrent-get",
                    "arguments": {"fields": TORRENT_FIELDS}
                }));
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": {"torrents": [{
                    "name": "album",
                    "hashString": "aabbccddeeff00112233445566778899aabbccdd",
                    "totalSize": 2048,
                    "uploadedEver": 512,
                    "percentDone": 0.5,
                    "addedDate": 1_400_000_000,
                    "error": 2,
                    "errorString": "tracker unreachable",
                    "downloadDir": "/downloads/7",
                    "trackers": [
                        {"announce": "http://b/announce", "tier": 1},
                        {"announce": "http://a/announce", "tier": 0},
                        {"announce": "http://c/announce", "tier": 1}
                    ]
                }]}
            }));
        });

        let snapshots = backend(&server)?.snapshots(None).await?;
        mock.assert();
        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.content_hash, "AABBCCDDEEFF00112233445566778899AABBCCDD");
        assert_eq!(snapshot.location_path, "/downloads");
        assert_eq!(snapshot.size_bytes, 2048);
        assert_eq!(snapshot.uploaded_bytes, 512);
        assert_eq!(snapshot.error.as_deref(), Some("tracker unreachable"));
        assert_eq!(snapshot.date_added.timestamp(), 1_400_000_000);
        assert_eq!(
            snapshot.announce_tiers,
            vec![
                vec!["http://a/announce".to_string()],
                vec!["http://b/announce".to_string(), "http://c/announce".to_string()],
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn conflict_negotiates_session_id() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let accepted = server.mock(|when, then| {
            when.method(POST)
                .path("/transmission/rpc")
                .header(SESSION_HEADER, "sid-1");
            then.status(200)
                .json_body(json!({"result": "success", "arguments": {}}));
        });
        let conflict = server.mock(|when, then| {
            when.method(POST).path("/transmission/rpc");
            then.status(409).header(SESSION_HEADER, "sid-1");
        });

        let backend = backend(&server)?;
        backend.remove_item("AABB").await?;
        conflict.assert();
        accepted.assert();
        Ok(())
    }

    #[tokio::test]
    async fn add_sends_metainfo_and_directory() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        let fixture = TorrentFixture::new("album");
        let bytes = fixture.bytes();
        let expected = json!({
            "method": "torrent-add",
            "arguments": {"metainfo": STANDARD.encode(&bytes), "download-dir": "/downloads/7"}
        });
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/transmission/rpc")
                .json_body(expected);
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": {"torrent-added": {"hashString": "aa"}}
            }));
        });

        backend(&server)?.add_item(&bytes, "/downloads/7").await?;
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_add_is_already_placed() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/transmission/rpc");
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": {"torrent-duplicate": {"hashString": "aabb"}}
            }));
        });

        let err = backend(&server)?
            .add_item(&TorrentFixture::new("album").bytes(), "/downloads/7")
            .await
            .err();
        assert!(matches!(
            err,
            Some(FleetError::AlreadyPlaced { ref content_hash, .. }) if content_hash == "AABB"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rpc_failures_surface_as_unavailable() -> Result<(), Box<dyn Error>> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/transmission/rpc");
            then.status(200)
                .json_body(json!({"result": "no such method", "arguments": {}}));
        });

        let err = backend(&server)?.remove_item("AABB").await.err();
        assert!(matches!(err, Some(FleetError::BackendUnavailable { .. })));
        Ok(())
    }

    #[test]
    fn connect_rejects_bad_params() {
        let instance = WorkerInstance {
            id: WorkerId(1),
            backend: BACKEND_TAG.to_string(),
            params: json!({"username": "nobody"}),
        };
        assert!(matches!(
            connect(&instance),
            Err(FleetError::BackendUnavailable {
                operation: "parse_params",
                ..
            })
        ));

        let instance = WorkerInstance {
            params: json!({"url": "http://127.0.0.1:9091/transmission/rpc"}),
            ..instance
        };
        assert!(connect(&instance).is_ok());
    }
}
