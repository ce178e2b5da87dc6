//! Test fixtures and database helpers.

use crate::backend::FakeBackend;
use partsync_engine::{DatabaseApplier, HttpTransport, LoopbackClient, SyncConfig, SyncEngine};
use partsync_store::Database;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Base URL used for loopback engines.
pub const LOOPBACK_URL: &str = "http://loopback.test/api";

/// An engine wired to a [`FakeBackend`] over the real HTTP transport.
pub type LoopbackEngine =
    SyncEngine<HttpTransport<LoopbackClient<Arc<FakeBackend>>>, DatabaseApplier>;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Arc<Database>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Arc::new(Database::open_in_memory().expect("Failed to open in-memory database")),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path().join("partsync.db"))
            .expect("Failed to open file database");
        Self {
            db: Arc::new(db),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("partsync.db"))
    }

    /// Closes and reopens a file-based database.
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only file databases can be reopened");
        drop(self.db);
        let db = Database::open(temp_dir.path().join("partsync.db"))
            .expect("Failed to reopen file database");
        Self {
            db: Arc::new(db),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns a new handle to the database.
    pub fn handle(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Creates an engine talking to `backend` through the loopback HTTP client.
pub fn loopback_engine(backend: Arc<FakeBackend>, db: Arc<Database>) -> LoopbackEngine {
    loopback_engine_with(SyncConfig::new(LOOPBACK_URL), backend, db)
}

/// Like [`loopback_engine`] with a custom configuration.
pub fn loopback_engine_with(
    config: SyncConfig,
    backend: Arc<FakeBackend>,
    db: Arc<Database>,
) -> LoopbackEngine {
    let transport = HttpTransport::new(config.server_url.clone(), LoopbackClient::new(backend));
    SyncEngine::new(config, transport, DatabaseApplier::new(db))
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Arc<Database>) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Arc<Database>, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use partsync_store::Collection;

    #[test]
    fn memory_database_is_migrated() {
        with_temp_db(|db| {
            assert_eq!(db.count(Collection::PRODUCTS).unwrap(), 0);
        });
    }

    #[test]
    fn file_database_reopens() {
        let test_db = TestDatabase::file();
        let path = test_db.path().unwrap();
        let test_db = test_db.reopen();
        assert_eq!(test_db.path(), Some(path.clone()));
        assert!(path.exists());
    }
}
