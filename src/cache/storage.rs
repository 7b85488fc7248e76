//! Cache storage trait and SQLite implementation.

use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::db::Database;
use crate::error::StorageError;
use crate::snapshot::{RequestSnapshot, ResponseSnapshot};

/// Trait for response cache backends.
///
/// Entries are partitioned by cache name and keyed by
/// [`RequestSnapshot::cache_key`].
pub trait CacheStorage: Send + Sync {
  /// Look up the response stored for a request.
  fn match_request(
    &self,
    cache_name: &str,
    request: &RequestSnapshot,
  ) -> Result<Option<ResponseSnapshot>, StorageError>;

  /// Store a response for a request, replacing any previous one.
  fn put(
    &self,
    cache_name: &str,
    request: &RequestSnapshot,
    response: &ResponseSnapshot,
  ) -> Result<(), StorageError>;

  /// Remove the response for a request. Returns whether one was stored.
  fn delete(&self, cache_name: &str, request: &RequestSnapshot) -> Result<bool, StorageError>;

  /// Requests (method and URL only) that currently have a stored response.
  fn keys(&self, cache_name: &str) -> Result<Vec<RequestSnapshot>, StorageError>;
}

/// A cache storage bound to one cache name.
pub struct CacheHandle<S: CacheStorage> {
  storage: Arc<S>,
  cache_name: String,
}

impl<S: CacheStorage> CacheHandle<S> {
  /// Open the named cache on a storage backend.
  pub fn open(storage: Arc<S>, cache_name: impl Into<String>) -> Self {
    Self {
      storage,
      cache_name: cache_name.into(),
    }
  }

  pub fn name(&self) -> &str {
    &self.cache_name
  }

  pub fn match_request(
    &self,
    request: &RequestSnapshot,
  ) -> Result<Option<ResponseSnapshot>, StorageError> {
    self.storage.match_request(&self.cache_name, request)
  }

  pub fn put(
    &self,
    request: &RequestSnapshot,
    response: &ResponseSnapshot,
  ) -> Result<(), StorageError> {
    self.storage.put(&self.cache_name, request, response)
  }

  pub fn delete(&self, request: &RequestSnapshot) -> Result<bool, StorageError> {
    self.storage.delete(&self.cache_name, request)
  }

  pub fn keys(&self) -> Result<Vec<RequestSnapshot>, StorageError> {
    self.storage.keys(&self.cache_name)
  }
}

impl<S: CacheStorage> Clone for CacheHandle<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      cache_name: self.cache_name.clone(),
    }
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopCacheStorage;

impl CacheStorage for NoopCacheStorage {
  fn match_request(
    &self,
    _cache_name: &str,
    _request: &RequestSnapshot,
  ) -> Result<Option<ResponseSnapshot>, StorageError> {
    Ok(None) // Always miss
  }

  fn put(
    &self,
    _cache_name: &str,
    _request: &RequestSnapshot,
    _response: &ResponseSnapshot,
  ) -> Result<(), StorageError> {
    Ok(()) // Discard
  }

  fn delete(&self, _cache_name: &str, _request: &RequestSnapshot) -> Result<bool, StorageError> {
    Ok(false)
  }

  fn keys(&self, _cache_name: &str) -> Result<Vec<RequestSnapshot>, StorageError> {
    Ok(Vec::new())
  }
}

/// SQLite-based response cache.
pub struct SqliteCacheStorage {
  db: Arc<Database>,
}

impl SqliteCacheStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteCacheStorage {
  fn match_request(
    &self,
    cache_name: &str,
    request: &RequestSnapshot,
  ) -> Result<Option<ResponseSnapshot>, StorageError> {
    let conn = self.db.conn()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM response_cache
         WHERE cache_name = ? AND request_key = ?",
        params![cache_name, request.cache_key()],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
      None => Ok(None),
    }
  }

  fn put(
    &self,
    cache_name: &str,
    request: &RequestSnapshot,
    response: &ResponseSnapshot,
  ) -> Result<(), StorageError> {
    let data = serde_json::to_vec(response)?;
    let conn = self.db.conn()?;

    conn.execute(
      "INSERT OR REPLACE INTO response_cache (cache_name, request_key, method, url, data, cached_at)
       VALUES (?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        request.cache_key(),
        request.method,
        request.url,
        data
      ],
    )?;

    Ok(())
  }

  fn delete(&self, cache_name: &str, request: &RequestSnapshot) -> Result<bool, StorageError> {
    let conn = self.db.conn()?;
    let removed = conn.execute(
      "DELETE FROM response_cache WHERE cache_name = ? AND request_key = ?",
      params![cache_name, request.cache_key()],
    )?;
    Ok(removed > 0)
  }

  fn keys(&self, cache_name: &str) -> Result<Vec<RequestSnapshot>, StorageError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare(
      "SELECT method, url FROM response_cache
       WHERE cache_name = ?
       ORDER BY url, method",
    )?;

    let keys = stmt
      .query_map(params![cache_name], |row| {
        let method: String = row.get(0)?;
        let url: String = row.get(1)?;
        Ok(RequestSnapshot::new(method, url))
      })?
      .collect::<Result<Vec<_>, _>>()?;

    Ok(keys)
  }
}
