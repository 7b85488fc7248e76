//! FIFO/LIFO access to one named partition of the entry store.

use std::sync::Arc;
use tracing::debug;

use super::entry::{QueueEntry, QueuedRequest};
use super::store::EntryStore;
use crate::error::StorageError;

/// One named queue over a shared entry store.
///
/// Natural order is ascending id: push appends at the tail, unshift inserts
/// at the head, shift takes from the head and pop from the tail. Storage
/// errors propagate unchanged.
///
/// `unshift_entry` reads the global minimum id and inserts below it in two
/// separate store calls. Two concurrent unshifts may read the same minimum
/// and collide; the loser fails with a storage error.
pub struct OrderedQueue<S: EntryStore> {
  store: Arc<S>,
  queue_name: String,
}

impl<S: EntryStore> OrderedQueue<S> {
  pub fn new(store: Arc<S>, queue_name: impl Into<String>) -> Self {
    Self {
      store,
      queue_name: queue_name.into(),
    }
  }

  pub fn name(&self) -> &str {
    &self.queue_name
  }

  /// Append to the tail. Returns the id the store assigned.
  pub fn push_entry(&self, payload: QueuedRequest) -> Result<i64, StorageError> {
    let id = self.store.add_entry(&QueueEntry {
      id: None,
      queue_name: self.queue_name.clone(),
      payload,
    })?;
    debug!(queue = %self.queue_name, id, "pushed entry");
    Ok(id)
  }

  /// Insert at the head, below every id in the store across all queue names.
  pub fn unshift_entry(&self, payload: QueuedRequest) -> Result<i64, StorageError> {
    let id = self
      .store
      .get_first_entry_id()?
      .map(|first| first.saturating_sub(1));

    let id = self.store.add_entry(&QueueEntry {
      id,
      queue_name: self.queue_name.clone(),
      payload,
    })?;
    debug!(queue = %self.queue_name, id, "unshifted entry");
    Ok(id)
  }

  /// Remove and return the tail entry.
  pub fn pop_entry(&self) -> Result<Option<QueueEntry>, StorageError> {
    let entry = self.store.get_last_entry_by_queue_name(&self.queue_name)?;
    self.remove(entry)
  }

  /// Remove and return the head entry.
  pub fn shift_entry(&self) -> Result<Option<QueueEntry>, StorageError> {
    let entry = self.store.get_first_entry_by_queue_name(&self.queue_name)?;
    self.remove(entry)
  }

  pub fn get_all(&self) -> Result<Vec<QueueEntry>, StorageError> {
    self.store.get_all_entries_by_queue_name(&self.queue_name)
  }

  pub fn size(&self) -> Result<usize, StorageError> {
    self.store.get_entry_count_by_queue_name(&self.queue_name)
  }

  /// Delete by id without checking which queue owns it.
  pub fn delete_entry(&self, id: i64) -> Result<(), StorageError> {
    self.store.delete_entry(id)
  }

  fn remove(&self, entry: Option<QueueEntry>) -> Result<Option<QueueEntry>, StorageError> {
    if let Some(id) = entry.as_ref().and_then(|e| e.id) {
      self.store.delete_entry(id)?;
      debug!(queue = %self.queue_name, id, "removed entry");
    }
    Ok(entry)
  }
}

impl<S: EntryStore> Clone for OrderedQueue<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      queue_name: self.queue_name.clone(),
    }
  }
}
