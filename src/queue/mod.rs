//! Durable, ordered request queue for background sync.
//!
//! This module provides:
//! - An entry store that persists request snapshots under a global integer id space
//! - A per-name FIFO/LIFO facade over that store
//! - A request-level queue that stamps timestamps and drops expired entries

mod background;
mod entry;
mod ordered;
mod store;

pub use background::BackgroundQueue;
pub use entry::{QueueEntry, QueuedRequest};
pub use ordered::OrderedQueue;
pub use store::{EntryStore, SqliteEntryStore};
