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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Data access layer for the Trove fleet: the record store contract, the
//! Postgres implementation with its migrations, and an in-memory store.

pub mod contract;
pub mod error;
pub mod memory;
pub mod postgres;

pub use contract::{FleetStore, RecordFilter};
pub use error::{DataError, Result as DataResult};
pub use memory::MemoryFleetStore;
pub use postgres::PgFleetStore;
