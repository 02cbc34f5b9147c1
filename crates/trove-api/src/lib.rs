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

//! HTTP/JSON surface of the fleet manager.
//!
//! Layout: `router.rs` (route table, layers, server host), `state.rs` (shared
//! handles), `errors.rs` (envelope and error mapping), `telemetry.rs`
//! (per-route request metrics), `handlers/` (one module per resource).

pub mod errors;
mod handlers;
pub mod router;
pub mod state;
mod telemetry;

pub use errors::{Envelope, ServeError};
pub use router::ApiServer;
pub use state::ApiState;
