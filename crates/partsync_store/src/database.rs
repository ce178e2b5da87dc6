//! Database handle.

use crate::error::StoreResult;
use crate::record::StoredRow;
use crate::schema::{self, Collection};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The embedded local store.
///
/// Wraps a single SQLite connection behind a mutex, so a write transaction
/// excludes every other access for its duration. The schema is created on
/// open if it does not exist yet.
///
/// # Example
///
/// ```rust,ignore
/// use partsync_store::{Collection, Database};
///
/// let db = Database::open_in_memory()?;
/// let count = db.transaction(|txn| Collection::PRODUCTS.count(txn, false))?;
/// ```
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (or creates) a database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Opens an in-memory database (useful for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Returns the database file path, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the recorded schema version.
    pub fn schema_version(&self) -> StoreResult<i32> {
        let conn = self.conn.lock();
        Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    /// Executes a write transaction.
    ///
    /// The transaction takes the write lock up front (`BEGIN IMMEDIATE`).
    /// It commits if the closure returns `Ok` and rolls back otherwise.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock();
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Runs a closure against the connection outside of an explicit transaction.
    pub fn read<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Gets a row by server id (tombstoned rows included).
    pub fn get_by_server_id(
        &self,
        collection: Collection,
        server_id: &str,
    ) -> StoreResult<Option<StoredRow>> {
        self.read(|conn| collection.find_by_server_id(conn, server_id))
    }

    /// Counts live rows in a collection.
    pub fn count(&self, collection: Collection) -> StoreResult<usize> {
        self.read(|conn| collection.count(conn, false))
    }

    /// Lists live rows in a collection.
    pub fn list(&self, collection: Collection) -> StoreResult<Vec<StoredRow>> {
        self.read(|conn| collection.list(conn))
    }

    /// Lists rows awaiting push in a collection.
    pub fn pending(&self, collection: Collection) -> StoreResult<Vec<StoredRow>> {
        self.read(|conn| collection.pending(conn))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
