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

//! Content-addressed storage of torrent descriptions, keyed by
//! `(announce_set_hash, content_hash)`.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::ContentStore;
