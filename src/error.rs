//! Error types shared by the queue, the response cache and the fetch strategy.

use std::path::PathBuf;
use std::time::Duration;

/// Failure of the persistent medium backing the queue or the response cache.
///
/// Never retried internally; callers decide what to do with it.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("Could not determine data directory")]
  NoDataDir,

  #[error("Failed to create database directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("Failed to open database at {path}: {source}")]
  Open {
    path: PathBuf,
    source: rusqlite::Error,
  },

  #[error("Database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("Failed to (de)serialize stored record: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Lock poisoned: {0}")]
  LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
  fn from(e: std::sync::PoisonError<T>) -> Self {
    Self::LockPoisoned(e.to_string())
  }
}

/// The network did not settle before the configured timeout.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Network request timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// Why the network path of a request failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
  #[error(transparent)]
  Timeout(#[from] TimeoutError),

  #[error("Network request failed: {0}")]
  Transport(String),
}

/// Errors surfaced to callers of the network-first strategy.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
  /// Both the network and the cache came up empty.
  #[error("No response available for {url}: {message}")]
  NetworkFallback { url: String, message: String },

  #[error(transparent)]
  Storage(#[from] StorageError),
}
