//! Request-level queue used to hold failed mutating requests until they can be replayed.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use super::entry::{QueueEntry, QueuedRequest};
use super::ordered::OrderedQueue;
use super::store::EntryStore;
use crate::error::StorageError;

/// Background-sync queue with a retention window.
///
/// Entries older than `max_retention` are dropped when they are read
/// instead of being handed back for replay.
pub struct BackgroundQueue<S: EntryStore> {
  queue: OrderedQueue<S>,
  max_retention: Duration,
}

impl<S: EntryStore> BackgroundQueue<S> {
  pub fn new(store: Arc<S>, name: impl Into<String>) -> Self {
    Self {
      queue: OrderedQueue::new(store, name),
      max_retention: Duration::days(7),
    }
  }

  /// Set how long a queued request stays eligible for replay.
  pub fn with_max_retention(mut self, max_retention: Duration) -> Self {
    self.max_retention = max_retention;
    self
  }

  pub fn name(&self) -> &str {
    self.queue.name()
  }

  pub fn push_request(&self, request: QueuedRequest) -> Result<i64, StorageError> {
    self.queue.push_entry(request)
  }

  pub fn unshift_request(&self, request: QueuedRequest) -> Result<i64, StorageError> {
    self.queue.unshift_entry(request)
  }

  /// Remove and return the newest live entry, discarding expired ones on the way.
  pub fn pop_request(&self) -> Result<Option<QueueEntry>, StorageError> {
    self.take_live(|queue| queue.pop_entry())
  }

  /// Remove and return the oldest live entry, discarding expired ones on the way.
  pub fn shift_request(&self) -> Result<Option<QueueEntry>, StorageError> {
    self.take_live(|queue| queue.shift_entry())
  }

  /// All live entries in queue order. Expired entries are deleted.
  pub fn get_all(&self) -> Result<Vec<QueueEntry>, StorageError> {
    let now = Utc::now().timestamp_millis();
    let mut live = Vec::new();

    for entry in self.queue.get_all()? {
      if self.is_expired(&entry.payload, now) {
        if let Some(id) = entry.id {
          self.queue.delete_entry(id)?;
          debug!(queue = %self.name(), id, "dropped expired entry");
        }
      } else {
        live.push(entry);
      }
    }

    Ok(live)
  }

  /// Number of stored entries, expired ones included.
  pub fn size(&self) -> Result<usize, StorageError> {
    self.queue.size()
  }

  pub fn delete_entry(&self, id: i64) -> Result<(), StorageError> {
    self.queue.delete_entry(id)
  }

  fn take_live<F>(&self, take: F) -> Result<Option<QueueEntry>, StorageError>
  where
    F: Fn(&OrderedQueue<S>) -> Result<Option<QueueEntry>, StorageError>,
  {
    let now = Utc::now().timestamp_millis();

    while let Some(entry) = take(&self.queue)? {
      if !self.is_expired(&entry.payload, now) {
        return Ok(Some(entry));
      }
      debug!(queue = %self.name(), id = ?entry.id, "dropped expired entry");
    }

    Ok(None)
  }

  fn is_expired(&self, request: &QueuedRequest, now: i64) -> bool {
    now - request.timestamp > self.max_retention.num_milliseconds()
  }
}
