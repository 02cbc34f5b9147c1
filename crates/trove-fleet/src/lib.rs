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

//! Fleet core: keeps the record store in line with what each worker holds,
//! decides where new torrents go, and drains the admission backlog.
//!
//! Layout: `registry.rs` (backend tag constructors), `state.rs` (worker arena
//! and locks), `reconcile.rs` (three-way diff), `placement.rs` (worker
//! selection), `manager.rs` (add/delete and the periodic loops), `queue.rs`
//! (admission backlog), `ingest.rs` (tracker downloads), `status.rs` (status
//! lookup).

pub mod ingest;
pub mod manager;
pub mod placement;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod state;
pub mod status;

#[cfg(test)]
mod testing;

pub use ingest::TrackerIngest;
pub use manager::{AddedItem, FleetManager, FleetSettings};
pub use placement::choose_worker;
pub use queue::DrainOutcome;
pub use reconcile::{
    FailedPhases, ReconcileReport, RecordDiff, SyncScope, apply_diff, compute_diff, reconcile,
};
pub use registry::BackendRegistry;
pub use state::{FleetState, WorkerHandle};
pub use status::{StatusQuery, lookup_status};
