//! Applying pulled changes to the local store.
//!
//! [`DatabaseApplier`] writes a whole multi-table batch in one transaction
//! and keeps the cursors and pending-row bookkeeping the engine needs.

use crate::error::SyncResult;
use crate::registry::descriptor;
use partsync_protocol::SyncableTable;
use partsync_store::{
    Collection, Connection, CursorStore, Database, LocalRecord, StoreResult, StoredRow,
    SyncStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mapped changes for one table, in apply order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    /// Target table.
    pub table: SyncableTable,
    /// Rows the server created.
    pub created: Vec<LocalRecord>,
    /// Rows the server updated.
    pub updated: Vec<LocalRecord>,
    /// Server ids the server deleted.
    pub deleted: Vec<String>,
}

impl TableBatch {
    /// Creates an empty batch for a table.
    pub fn new(table: SyncableTable) -> Self {
        Self {
            table,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Returns true if the batch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// A pulled changeset after mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    /// Server timestamp of the pull; used as the tombstone time.
    pub timestamp: i64,
    /// Per-table changes.
    pub tables: Vec<TableBatch>,
}

/// Per-table apply counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableReport {
    /// Rows inserted.
    pub created: usize,
    /// Rows overwritten.
    pub updated: usize,
    /// Rows tombstoned.
    pub deleted: usize,
    /// Changes skipped (already present, already deleted, or pending locally).
    pub skipped: usize,
    /// Updates for rows that do not exist locally.
    pub missing: usize,
    /// Records that failed to map or to write.
    pub failed: usize,
}

impl TableReport {
    /// Rows actually written.
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Outcome of applying a changeset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Counts per table.
    pub tables: BTreeMap<SyncableTable, TableReport>,
}

impl ApplyReport {
    /// Returns the report of a table, creating it if needed.
    pub fn table_mut(&mut self, table: SyncableTable) -> &mut TableReport {
        self.tables.entry(table).or_default()
    }

    /// Returns the report of a table.
    pub fn table(&self, table: SyncableTable) -> TableReport {
        self.tables.get(&table).copied().unwrap_or_default()
    }

    /// Total rows written.
    pub fn total_applied(&self) -> usize {
        self.tables.values().map(TableReport::applied).sum()
    }

    /// Total records that failed.
    pub fn total_failed(&self) -> usize {
        self.tables.values().map(|t| t.failed).sum()
    }
}

/// Local side of a sync: cursors, changeset application and pending rows.
pub trait SyncApplier: Send + Sync {
    /// Returns the smallest cursor across `tables`.
    fn watermark(&self, tables: &[SyncableTable]) -> SyncResult<i64>;

    /// Applies a mapped changeset atomically.
    fn apply(&self, batch: &ChangeBatch) -> SyncResult<ApplyReport>;

    /// Sets the cursor of every table in `tables` after a successful apply.
    fn advance_cursors(&self, tables: &[SyncableTable], timestamp: i64) -> SyncResult<()>;

    /// Gets rows of `table` awaiting push.
    fn pending(&self, table: SyncableTable) -> SyncResult<Vec<StoredRow>>;

    /// Marks pushed rows as synced. See [`Collection::acknowledge`].
    fn acknowledge(&self, table: SyncableTable, rows: &[(String, i64)]) -> SyncResult<usize>;
}

/// A sync applier backed by the local SQLite store.
///
/// # Example
///
/// ```ignore
/// use partsync_engine::DatabaseApplier;
/// use partsync_store::Database;
/// use std::sync::Arc;
///
/// let db = Arc::new(Database::open_in_memory()?);
/// let applier = DatabaseApplier::new(db);
/// let engine = SyncEngine::new(config, transport, applier);
/// ```
pub struct DatabaseApplier {
    database: Arc<Database>,
    cursors: CursorStore,
}

enum Outcome {
    Applied,
    Skipped,
    Missing,
}

impl DatabaseApplier {
    /// Creates a new database-backed applier.
    pub fn new(database: Arc<Database>) -> Self {
        let cursors = CursorStore::new(Arc::clone(&database));
        Self { database, cursors }
    }

    /// Gets the underlying database.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Gets the cursor store.
    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    fn apply_table(
        conn: &Connection,
        batch: &TableBatch,
        deleted_at: i64,
        report: &mut TableReport,
    ) {
        let table = batch.table;
        let collection = descriptor(table).collection;

        for record in &batch.created {
            let server_id = &record.server_id;
            match apply_created(conn, collection, record) {
                Ok(Outcome::Applied) => report.created += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(%table, %server_id, error = %e, "failed to insert record");
                    report.failed += 1;
                }
            }
        }

        for record in &batch.updated {
            let server_id = &record.server_id;
            match apply_updated(conn, collection, record) {
                Ok(Outcome::Applied) => report.updated += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Ok(Outcome::Missing) => {
                    tracing::debug!(%table, %server_id, "update for unknown row ignored");
                    report.missing += 1;
                }
                Err(e) => {
                    tracing::warn!(%table, %server_id, error = %e, "failed to update record");
                    report.failed += 1;
                }
            }
        }

        for server_id in &batch.deleted {
            match apply_deleted(conn, collection, server_id, deleted_at) {
                Ok(Outcome::Applied) => report.deleted += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(%table, %server_id, error = %e, "failed to delete record");
                    report.failed += 1;
                }
            }
        }
    }
}

fn apply_created(
    conn: &Connection,
    collection: Collection,
    record: &LocalRecord,
) -> StoreResult<Outcome> {
    if collection.find_by_server_id(conn, &record.server_id)?.is_some() {
        return Ok(Outcome::Skipped);
    }
    collection.insert(conn, record, SyncStatus::Synced)?;
    Ok(Outcome::Applied)
}

fn apply_updated(
    conn: &Connection,
    collection: Collection,
    record: &LocalRecord,
) -> StoreResult<Outcome> {
    match collection.find_by_server_id(conn, &record.server_id)? {
        None => Ok(Outcome::Missing),
        Some(row) if row.sync_status.is_pending() => Ok(Outcome::Skipped),
        Some(row) => {
            collection.overwrite(conn, &row.id, record)?;
            Ok(Outcome::Applied)
        }
    }
}

fn apply_deleted(
    conn: &Connection,
    collection: Collection,
    server_id: &str,
    deleted_at: i64,
) -> StoreResult<Outcome> {
    match collection.find_by_server_id(conn, server_id)? {
        Some(row) if !row.is_deleted() && !row.sync_status.is_pending() => {
            collection.tombstone(conn, &row.id, deleted_at)?;
            Ok(Outcome::Applied)
        }
        _ => Ok(Outcome::Skipped),
    }
}

impl SyncApplier for DatabaseApplier {
    fn watermark(&self, tables: &[SyncableTable]) -> SyncResult<i64> {
        Ok(self.cursors.watermark(tables)?)
    }

    fn apply(&self, batch: &ChangeBatch) -> SyncResult<ApplyReport> {
        let mut report = ApplyReport::default();
        if batch.tables.iter().all(TableBatch::is_empty) {
            return Ok(report);
        }

        // One transaction for the whole changeset
        self.database.transaction(|txn| {
            for table in &batch.tables {
                Self::apply_table(txn, table, batch.timestamp, report.table_mut(table.table));
            }
            Ok(())
        })?;

        Ok(report)
    }

    fn advance_cursors(&self, tables: &[SyncableTable], timestamp: i64) -> SyncResult<()> {
        Ok(self.cursors.advance(tables, timestamp)?)
    }

    fn pending(&self, table: SyncableTable) -> SyncResult<Vec<StoredRow>> {
        Ok(self.database.pending(descriptor(table).collection)?)
    }

    fn acknowledge(&self, table: SyncableTable, rows: &[(String, i64)]) -> SyncResult<usize> {
        let collection = descriptor(table).collection;
        Ok(self
            .database
            .transaction(|txn| collection.acknowledge(txn, rows))?)
    }
}
