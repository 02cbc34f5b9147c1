//! Fallback values applied when a variable is absent.
//!
//! # Design
//! - Keep every default in one place so the loader and docs agree.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub(crate) const BIND_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 7070));
pub(crate) const STORE_DIR: &str = "./data/torrents";
pub(crate) const STATE_DIR: &str = "./data/state";
pub(crate) const UPDATE_INTERVAL_SECS: u64 = 3;
pub(crate) const FULL_UPDATE_INTERVAL_SECS: u64 = 30;
pub(crate) const QUEUE_POP_INTERVAL_SECS: u64 = 30;
pub(crate) const UPDATE_POOL_SIZE: usize = 1;
pub(crate) const INTERACTIVE_POOL_SIZE: usize = 2;
pub(crate) const TRACKER_NAME: &str = "what.cd";
pub(crate) const TRACKER_RATE_LIMIT: usize = 5;
pub(crate) const TRACKER_RATE_WINDOW_SECS: u64 = 10;
pub(crate) const TRACKER_RETRY_LIMIT: u32 = 5;
/// File name of the tracker session cache inside the state directory.
pub(crate) const SESSION_CACHE_FILE: &str = "tracker-session.json";
