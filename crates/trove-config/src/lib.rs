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

//! Typed service configuration read from the process environment.
//!
//! Layout: `defaults.rs` (fallback values), `model.rs` (typed sections),
//! `loader.rs` (`AppConfig::from_env` and validation), `error.rs`.

mod defaults;
pub mod error;
mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{AppConfig, FleetIntervals, LoggingSettings, TrackerConfig};
