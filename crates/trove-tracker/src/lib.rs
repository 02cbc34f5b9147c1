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

//! Client for the tracker's AJAX metadata API.
//!
//! Layout: `limiter.rs` (sliding-window rate limiter), `cookies.rs` (session
//! cookie jar), `session.rs` (persisted login cache), `client.rs` (API calls,
//! login, retries, torrent downloads), `error.rs`.

pub mod client;
pub mod cookies;
pub mod error;
pub mod limiter;
pub mod session;

pub use client::{ClientSettings, MetadataClient};
pub use cookies::SessionCookies;
pub use error::{TrackerError, TrackerResult};
pub use limiter::RateLimiter;
pub use session::{JsonFileSessionCache, PersistedSession, SessionCache};
