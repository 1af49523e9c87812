//! Storage for rejected raw telemetry strings.
//!
//! [`MemoryErrorStore`] keeps entries for the life of the process.
//! [`SqliteErrorStore`] keeps them in a single `errors` table so they survive
//! restarts. Both preserve insertion order and serialise appends against
//! clears through one lock.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::lock;

/// Failure inside an error store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append/list/clear store for raw strings that failed to parse.
pub trait ErrorSink: Send + Sync {
    fn append(&self, raw: &str) -> Result<(), StoreError>;

    /// Every stored entry, oldest first.
    fn list(&self) -> Result<Vec<String>, StoreError>;

    fn clear_all(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local error log.
#[derive(Debug, Default)]
pub struct MemoryErrorStore {
    entries: Mutex<Vec<String>>,
}

impl MemoryErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored entries.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

impl ErrorSink for MemoryErrorStore {
    fn append(&self, raw: &str) -> Result<(), StoreError> {
        lock(&self.entries).push(raw.to_string());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        lock(&self.entries).clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_string TEXT NOT NULL
)";

/// Error log persisted to a SQLite database.
pub struct SqliteErrorStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteErrorStore {
    /// Open (or create) the database at `path` and ensure the table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database. Nothing survives the store being dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl ErrorSink for SqliteErrorStore {
    fn append(&self, raw: &str) -> Result<(), StoreError> {
        lock(&self.conn).execute("INSERT INTO errors (data_string) VALUES (?1)", [raw])?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare("SELECT data_string FROM errors ORDER BY id")?;
        let entries = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(entries)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        lock(&self.conn).execute("DELETE FROM errors", [])?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteErrorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteErrorStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
