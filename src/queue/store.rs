//! Entry store trait and SQLite implementation.

use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use super::entry::{QueueEntry, QueuedRequest};
use crate::db::Database;
use crate::error::StorageError;

/// Trait for queue entry storage backends.
///
/// Ids are global across all queue names. Each call applies fully or fails;
/// nothing spans calls.
pub trait EntryStore: Send + Sync {
  /// Insert an entry and return its id.
  ///
  /// Without an id, the next id above every id ever issued is assigned. An
  /// explicit id is used verbatim; the caller must avoid collisions.
  fn add_entry(&self, entry: &QueueEntry) -> Result<i64, StorageError>;

  /// Smallest id currently stored, across every queue name.
  fn get_first_entry_id(&self) -> Result<Option<i64>, StorageError>;

  /// Entry with the smallest id for a queue name.
  fn get_first_entry_by_queue_name(&self, queue_name: &str)
    -> Result<Option<QueueEntry>, StorageError>;

  /// Entry with the largest id for a queue name.
  fn get_last_entry_by_queue_name(&self, queue_name: &str)
    -> Result<Option<QueueEntry>, StorageError>;

  /// All entries for a queue name in ascending id order.
  fn get_all_entries_by_queue_name(&self, queue_name: &str) -> Result<Vec<QueueEntry>, StorageError>;

  fn get_entry_count_by_queue_name(&self, queue_name: &str) -> Result<usize, StorageError>;

  /// Remove an entry by id. Missing ids are a no-op.
  fn delete_entry(&self, id: i64) -> Result<(), StorageError>;
}

/// SQLite-based entry storage.
pub struct SqliteEntryStore {
  db: Arc<Database>,
}

impl SqliteEntryStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  fn get_entry_ordered(
    &self,
    queue_name: &str,
    order: &str,
  ) -> Result<Option<QueueEntry>, StorageError> {
    let conn = self.db.conn()?;
    let sql = format!(
      "SELECT id, queue_name, data FROM requests
       WHERE queue_name = ?
       ORDER BY id {}
       LIMIT 1",
      order
    );

    let row: Option<(i64, String, Vec<u8>)> = conn
      .query_row(&sql, params![queue_name], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .optional()?;

    row.map(decode_entry).transpose()
  }
}

impl EntryStore for SqliteEntryStore {
  fn add_entry(&self, entry: &QueueEntry) -> Result<i64, StorageError> {
    let data = serde_json::to_vec(&entry.payload)?;

    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;

    let id = match entry.id {
      Some(id) => id,
      None => {
        let last_id: i64 = tx.query_row(
          "SELECT last_id FROM request_sequence WHERE singleton = 0",
          [],
          |row| row.get(0),
        )?;
        last_id + 1
      }
    };

    tx.execute(
      "INSERT INTO requests (id, queue_name, data) VALUES (?, ?, ?)",
      params![id, entry.queue_name, data],
    )?;

    // Explicit ids above the counter advance it too, so they are never reissued
    tx.execute(
      "UPDATE request_sequence SET last_id = MAX(last_id, ?) WHERE singleton = 0",
      params![id],
    )?;

    tx.commit()?;

    Ok(id)
  }

  fn get_first_entry_id(&self) -> Result<Option<i64>, StorageError> {
    let conn = self.db.conn()?;
    let id: Option<i64> = conn.query_row("SELECT MIN(id) FROM requests", [], |row| row.get(0))?;
    Ok(id)
  }

  fn get_first_entry_by_queue_name(
    &self,
    queue_name: &str,
  ) -> Result<Option<QueueEntry>, StorageError> {
    self.get_entry_ordered(queue_name, "ASC")
  }

  fn get_last_entry_by_queue_name(
    &self,
    queue_name: &str,
  ) -> Result<Option<QueueEntry>, StorageError> {
    self.get_entry_ordered(queue_name, "DESC")
  }

  fn get_all_entries_by_queue_name(&self, queue_name: &str) -> Result<Vec<QueueEntry>, StorageError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare(
      "SELECT id, queue_name, data FROM requests
       WHERE queue_name = ?
       ORDER BY id ASC",
    )?;

    let rows = stmt
      .query_map(params![queue_name], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })?
      .collect::<Result<Vec<(i64, String, Vec<u8>)>, _>>()?;

    rows.into_iter().map(decode_entry).collect()
  }

  fn get_entry_count_by_queue_name(&self, queue_name: &str) -> Result<usize, StorageError> {
    let conn = self.db.conn()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM requests WHERE queue_name = ?",
      params![queue_name],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  fn delete_entry(&self, id: i64) -> Result<(), StorageError> {
    let conn = self.db.conn()?;
    conn.execute("DELETE FROM requests WHERE id = ?", params![id])?;
    Ok(())
  }
}

fn decode_entry((id, queue_name, data): (i64, String, Vec<u8>)) -> Result<QueueEntry, StorageError> {
  let payload: QueuedRequest = serde_json::from_slice(&data)?;
  Ok(QueueEntry {
    id: Some(id),
    queue_name,
    payload,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::snapshot::RequestSnapshot;

  fn store() -> SqliteEntryStore {
    SqliteEntryStore::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  fn entry(queue_name: &str, url: &str, id: Option<i64>) -> QueueEntry {
    QueueEntry {
      id,
      queue_name: queue_name.to_string(),
      payload: QueuedRequest::new(RequestSnapshot::new("POST", url)).with_timestamp(1),
    }
  }

  #[test]
  fn test_auto_ids_increase() {
    let store = store();

    let a = store.add_entry(&entry("q", "/a", None)).unwrap();
    let b = store.add_entry(&entry("q", "/b", None)).unwrap();

    assert_eq!(a, 1);
    assert_eq!(b, 2);
  }

  #[test]
  fn test_auto_ids_never_reused_after_delete() {
    let store = store();

    store.add_entry(&entry("q", "/a", None)).unwrap();
    let b = store.add_entry(&entry("q", "/b", None)).unwrap();
    store.delete_entry(b).unwrap();

    let c = store.add_entry(&entry("q", "/c", None)).unwrap();
    assert_eq!(c, b + 1);
  }

  #[test]
  fn test_explicit_id_used_verbatim_and_may_be_negative() {
    let store = store();

    let id = store.add_entry(&entry("q", "/a", Some(-7))).unwrap();

    assert_eq!(id, -7);
    assert_eq!(store.get_first_entry_id().unwrap(), Some(-7));
    // Counter is untouched by ids below it
    assert_eq!(store.add_entry(&entry("q", "/b", None)).unwrap(), 1);
  }

  #[test]
  fn test_explicit_id_above_counter_advances_it() {
    let store = store();

    store.add_entry(&entry("q", "/a", Some(41))).unwrap();

    assert_eq!(store.add_entry(&entry("q", "/b", None)).unwrap(), 42);
  }

  #[test]
  fn test_explicit_id_collision_fails() {
    let store = store();
    store.add_entry(&entry("q", "/a", Some(5))).unwrap();

    let result = store.add_entry(&entry("other", "/b", Some(5)));

    assert!(matches!(result, Err(StorageError::Sqlite(_))));
    assert_eq!(store.get_entry_count_by_queue_name("other").unwrap(), 0);
  }

  #[test]
  fn test_first_entry_id_spans_all_queues() {
    let store = store();
    assert_eq!(store.get_first_entry_id().unwrap(), None);

    store.add_entry(&entry("x", "/a", None)).unwrap();
    store.add_entry(&entry("y", "/b", Some(-3))).unwrap();

    assert_eq!(store.get_first_entry_id().unwrap(), Some(-3));
  }

  #[test]
  fn test_first_and_last_by_queue_name() {
    let store = store();
    store.add_entry(&entry("x", "/x1", None)).unwrap();
    store.add_entry(&entry("y", "/y1", None)).unwrap();
    store.add_entry(&entry("x", "/x2", None)).unwrap();

    let first = store.get_first_entry_by_queue_name("x").unwrap().unwrap();
    let last = store.get_last_entry_by_queue_name("x").unwrap().unwrap();

    assert_eq!(first.payload.request.url, "/x1");
    assert_eq!(first.id, Some(1));
    assert_eq!(last.payload.request.url, "/x2");
    assert_eq!(last.id, Some(3));
    assert!(store.get_first_entry_by_queue_name("z").unwrap().is_none());
    assert!(store.get_last_entry_by_queue_name("z").unwrap().is_none());
  }

  #[test]
  fn test_get_all_ascending_and_scoped() {
    let store = store();
    store.add_entry(&entry("x", "/x1", None)).unwrap();
    store.add_entry(&entry("y", "/y1", None)).unwrap();
    store.add_entry(&entry("x", "/x0", Some(-1))).unwrap();

    let urls: Vec<String> = store
      .get_all_entries_by_queue_name("x")
      .unwrap()
      .into_iter()
      .map(|e| e.payload.request.url)
      .collect();

    assert_eq!(urls, vec!["/x0", "/x1"]);
    assert_eq!(store.get_entry_count_by_queue_name("x").unwrap(), 2);
    assert_eq!(store.get_entry_count_by_queue_name("y").unwrap(), 1);
  }

  #[test]
  fn test_delete_missing_is_noop() {
    let store = store();
    store.add_entry(&entry("q", "/a", None)).unwrap();

    store.delete_entry(999).unwrap();

    assert_eq!(store.get_entry_count_by_queue_name("q").unwrap(), 1);
  }

  #[test]
  fn test_payload_round_trips_metadata() {
    let store = store();
    let mut original = entry("q", "/a", None);
    original.payload = original
      .payload
      .with_metadata(serde_json::json!({ "attempts": 2 }));
    original.payload.request = original
      .payload
      .request
      .clone()
      .with_header("Content-Type", "application/json")
      .with_body(br#"{"k":1}"#.to_vec());

    let id = store.add_entry(&original).unwrap();
    let stored = store.get_first_entry_by_queue_name("q").unwrap().unwrap();

    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.payload, original.payload);
  }

  #[test]
  fn test_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netsync.db");

    {
      let store = SqliteEntryStore::new(Arc::new(Database::open(&path).unwrap()));
      store.add_entry(&entry("q", "/a", None)).unwrap();
      let b = store.add_entry(&entry("q", "/b", None)).unwrap();
      store.delete_entry(b).unwrap();
    }

    let store = SqliteEntryStore::new(Arc::new(Database::open(&path).unwrap()));
    let all = store.get_all_entries_by_queue_name("q").unwrap();

    assert_eq!(all.len(), 1);
    assert_eq!(all[0].payload.request.url, "/a");
    // Counter persisted: the deleted id 2 is not reissued
    assert_eq!(store.add_entry(&entry("q", "/c", None)).unwrap(), 3);
  }
}
