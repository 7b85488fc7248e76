//! Network-first response caching and a durable background-sync request queue.
//!
//! - [`strategy::NetworkFirst`] races a fetch against a timeout and falls
//!   back to a SQLite response cache
//! - [`queue::OrderedQueue`] and [`queue::BackgroundQueue`] persist request
//!   snapshots for later replay, in order, across restarts

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod queue;
pub mod snapshot;
pub mod strategy;
