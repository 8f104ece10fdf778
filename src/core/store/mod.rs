//! Single-file SQLite store for the provider catalog, the settings profile
//! and per-session conversation history.

pub mod catalog;
pub mod history;
mod migrations;
pub mod settings;

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::core::config::data::path_display;

pub use catalog::{Model, Provider};
pub use history::{HistoryEntry, SessionStore};
pub use settings::Settings;

/// Errors raised by the local store.
#[derive(Debug)]
pub enum StoreError {
    /// The database directory could not be created.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// SQLite rejected a statement.
    Sqlite(rusqlite::Error),
    /// A row held a value the application cannot interpret.
    InvalidData(String),
    /// The blocking task running a query was lost.
    Task(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => write!(
                f,
                "Failed to prepare database directory {}: {}",
                path_display(path),
                source
            ),
            StoreError::Sqlite(err) => write!(f, "database error: {err}"),
            StoreError::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            StoreError::Task(message) => write!(f, "database task failed: {message}"),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Sqlite(err) => Some(err),
            StoreError::InvalidData(_) | StoreError::Task(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

/// Handle to the application database.
///
/// Cloning is cheap; all clones share one connection. SQLite is the single
/// writer, so statements are serialized behind a mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the database at `path`, migrate it and seed the
    /// built-in catalog.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(path = %path_display(path), "opening database");
        let conn = Connection::open(path)?;
        Self::initialize(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database. Used by tests and one-off runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, None)
    }

    fn initialize(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        catalog::seed_builtin_catalog(&mut conn)?;
        debug!("database initialization completed");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        // A panic while holding the lock cannot leave a half-applied
        // statement behind, so a poisoned connection is still usable.
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut conn)
    }

    /// Run `f` on the blocking pool so async callers never stall on disk I/O.
    pub async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_connection(f))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("chat.db");

        let db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(db.path(), Some(db_path.as_path()));
    }

    #[test]
    fn reopening_keeps_catalog_stable() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("chat.db");

        let first = Database::open(&db_path).unwrap();
        let before = first.providers().unwrap();
        drop(first);

        let second = Database::open(&db_path).unwrap();
        let after = second.providers().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn call_runs_on_blocking_pool() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
