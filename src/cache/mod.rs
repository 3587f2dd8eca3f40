//! Caching for fetched data.
//!
//! This module provides:
//! - A TTL store for transformed results, with lazy expiry on read
//! - An in-flight registry that shares one pending fetch among identical requests

mod inflight;
mod storage;

pub use inflight::{InFlightRegistry, SharedFuture, TaskAborted};
pub use storage::{CacheEntry, TtlCache};
