//! Durable response cache used as the fallback for network-first fetching.
//!
//! This module provides:
//! - A storage trait keyed by cache name and request identity
//! - A SQLite backend sharing the queue's database, and a no-op backend
//! - Result metadata describing where a response came from

mod result;
mod storage;

pub use result::{CacheResult, CacheSource};
pub use storage::{CacheHandle, CacheStorage, NoopCacheStorage, SqliteCacheStorage};
