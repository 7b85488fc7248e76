pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

/// Shared SQLite connection backing both the request queue and the response cache.
///
/// Every store operation takes the lock for the duration of a single call, so
/// individual operations are atomic but sequences of calls are not isolated.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at the given path.
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let conn = Connection::open(path).map_err(|source| StorageError::Open {
      path: path.to_path_buf(),
      source,
    })?;

    Self::from_connection(conn)
  }

  /// Open an in-memory database. Nothing survives the process.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StorageError::NoDataDir)?;

    Ok(data_dir.join("netsync").join("netsync.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<(), StorageError> {
    self.conn()?.execute_batch(schema::SCHEMA)?;
    Ok(())
  }

  /// Lock the connection for one operation.
  pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    Ok(self.conn.lock()?)
  }
}
