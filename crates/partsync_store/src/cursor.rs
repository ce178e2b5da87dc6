//! Per-table pull cursors.

use crate::database::Database;
use crate::error::StoreResult;
use partsync_protocol::SyncableTable;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;

/// A stored cursor row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCursor {
    /// Table wire name.
    pub table_name: String,
    /// Server timestamp of the last applied pull, in epoch milliseconds.
    pub last_pulled_at: i64,
}

/// Reads and advances the per-table pull watermarks.
///
/// A missing cursor reads as `0`. Cursors never move backwards: writing a
/// timestamp older than the stored one keeps the stored one.
#[derive(Debug, Clone)]
pub struct CursorStore {
    db: Arc<Database>,
}

impl CursorStore {
    /// Creates a cursor store over a database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns the cursor of a table, `0` if none was stored.
    pub fn get(&self, table: SyncableTable) -> StoreResult<i64> {
        self.db.read(|conn| read(conn, table))
    }

    /// Returns the smallest cursor across `tables` (`0` for an empty list).
    pub fn watermark(&self, tables: &[SyncableTable]) -> StoreResult<i64> {
        self.db.read(|conn| {
            let mut min: Option<i64> = None;
            for table in tables {
                let value = read(conn, *table)?;
                min = Some(min.map_or(value, |m| m.min(value)));
            }
            Ok(min.unwrap_or(0))
        })
    }

    /// Writes the cursor of one table. Returns the value now stored.
    pub fn set(&self, table: SyncableTable, last_pulled_at: i64) -> StoreResult<i64> {
        self.db.transaction(|txn| upsert(txn, table, last_pulled_at))
    }

    /// Writes the same cursor for several tables in one transaction.
    pub fn advance(&self, tables: &[SyncableTable], last_pulled_at: i64) -> StoreResult<()> {
        self.db.transaction(|txn| {
            for table in tables {
                upsert(txn, *table, last_pulled_at)?;
            }
            Ok(())
        })
    }

    /// Returns every stored cursor, ordered by table name.
    pub fn all(&self) -> StoreResult<Vec<SyncCursor>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT table_name, last_pulled_at FROM sync_cursors ORDER BY table_name",
            )?;
            let cursors = stmt
                .query_map([], |row| {
                    Ok(SyncCursor {
                        table_name: row.get(0)?,
                        last_pulled_at: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cursors)
        })
    }

    /// Forgets the cursor of one table, forcing a full re-pull.
    pub fn reset(&self, table: SyncableTable) -> StoreResult<bool> {
        let removed = self.db.transaction(|txn| {
            Ok(txn.execute(
                "DELETE FROM sync_cursors WHERE table_name = ?1",
                params![table.as_str()],
            )?)
        })?;
        tracing::info!(table = %table, "cursor reset");
        Ok(removed > 0)
    }

    /// Forgets every cursor. Returns the number removed.
    pub fn reset_all(&self) -> StoreResult<usize> {
        let removed = self
            .db
            .transaction(|txn| Ok(txn.execute("DELETE FROM sync_cursors", [])?))?;
        tracing::info!(removed, "all cursors reset");
        Ok(removed)
    }
}

fn read(conn: &Connection, table: SyncableTable) -> StoreResult<i64> {
    let value = conn
        .query_row(
            "SELECT last_pulled_at FROM sync_cursors WHERE table_name = ?1",
            params![table.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

fn upsert(conn: &Connection, table: SyncableTable, last_pulled_at: i64) -> StoreResult<i64> {
    let existing = read(conn, table)?;
    if last_pulled_at < existing {
        tracing::warn!(
            table = %table,
            stored = existing,
            reported = last_pulled_at,
            "server reported an older timestamp, keeping cursor"
        );
        return Ok(existing);
    }

    conn.execute(
        "INSERT INTO sync_cursors (table_name, last_pulled_at) VALUES (?1, ?2)
         ON CONFLICT(table_name) DO UPDATE
         SET last_pulled_at = MAX(last_pulled_at, excluded.last_pulled_at)",
        params![table.as_str(), last_pulled_at],
    )?;
    Ok(last_pulled_at)
}
