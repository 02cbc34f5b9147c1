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

//! Worker-agnostic torrent identity, fleet DTOs, and the worker backend contract.
//!
//! Layout: `bencode.rs` (binary codec), `identity.rs` (content identity derivation),
//! `model.rs` (fleet records and snapshots), `backend.rs` (worker adapter trait),
//! `error.rs` (shared fleet error taxonomy).

pub mod backend;
pub mod bencode;
pub mod error;
pub mod identity;
pub mod model;

pub use backend::WorkerBackend;
pub use error::{FleetError, FleetResult};
pub use identity::{
    ContentIdentity, decode_announces, derive_identity, encode_announces, hash_announces,
    hex_digest, is_identity_hash,
};
pub use model::{
    DownloadLocation, ItemStatus, LocationId, NewQueuedAddition, PersistedTorrentRecord,
    QueuedAddition, RecordId, RecordKey, TorrentRecord, TorrentSnapshot, TrackerTorrent,
    WorkerId, WorkerInstance,
};
