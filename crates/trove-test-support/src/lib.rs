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

//! Shared test helpers used across integration suites.
//! Layout: docker.rs (environment probes), torrent.rs (bencoded torrent fixtures),
//! backend.rs (in-memory worker backend).

pub mod backend;
pub mod docker;
pub mod torrent;

pub use backend::{AddedItem, RecordingBackend, snapshot};
pub use torrent::TorrentFixture;
