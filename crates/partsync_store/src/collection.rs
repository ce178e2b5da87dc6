//! Row-level operations on replicated collections.
//!
//! These take a plain `&Connection` so they work both on the shared
//! connection and inside a [`Database::transaction`](crate::Database::transaction)
//! closure (a `rusqlite::Transaction` derefs to a connection).

use crate::error::{StoreError, StoreResult};
use crate::record::{ColumnValue, LocalRecord, StoredRow, SyncStatus};
use crate::schema::{Collection, SYSTEM_COLUMNS};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::collections::BTreeMap;

impl Collection {
    fn select_sql(&self) -> String {
        let mut columns: Vec<&str> = SYSTEM_COLUMNS.to_vec();
        columns.extend(self.columns().iter().map(|c| c.name));
        format!("SELECT {} FROM {}", columns.join(", "), self.name())
    }

    fn read_row(&self, row: &Row<'_>) -> rusqlite::Result<StoredRow> {
        let mut columns = BTreeMap::new();
        for (i, column) in self.columns().iter().enumerate() {
            let value: ColumnValue = row.get(SYSTEM_COLUMNS.len() + i)?;
            columns.insert(column.name, value);
        }

        Ok(StoredRow {
            id: row.get(0)?,
            server_id: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            deleted_at: row.get(4)?,
            sync_status: row.get(5)?,
            local_version: row.get(6)?,
            columns,
        })
    }

    fn check_columns(&self, record: &LocalRecord) -> StoreResult<()> {
        match record.columns.keys().find(|name| self.column(name).is_none()) {
            Some(name) => Err(StoreError::UnknownColumn {
                collection: self.name(),
                column: (*name).to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Selects rows matching a `WHERE` clause (which may carry `ORDER BY`).
    pub fn select_where(
        &self,
        conn: &Connection,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> StoreResult<Vec<StoredRow>> {
        let sql = format!("{} WHERE {}", self.select_sql(), clause);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| self.read_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Finds a row by server id. Tombstoned rows are included.
    pub fn find_by_server_id(
        &self,
        conn: &Connection,
        server_id: &str,
    ) -> StoreResult<Option<StoredRow>> {
        let sql = format!("{} WHERE server_id = ?1", self.select_sql());
        let row = conn
            .query_row(&sql, params![server_id], |row| self.read_row(row))
            .optional()?;
        Ok(row)
    }

    /// Inserts a record under a fresh local id and returns that id.
    pub fn insert(
        &self,
        conn: &Connection,
        record: &LocalRecord,
        status: SyncStatus,
    ) -> StoreResult<String> {
        self.check_columns(record)?;

        let id = uuid::Uuid::new_v4().to_string();
        let mut names: Vec<&str> =
            vec!["id", "server_id", "created_at", "updated_at", "sync_status"];
        let mut values: Vec<&dyn ToSql> = vec![
            &id as &dyn ToSql,
            &record.server_id,
            &record.created_at,
            &record.updated_at,
            &status,
        ];
        for (name, value) in &record.columns {
            names.push(*name);
            values.push(value);
        }

        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name(),
            names.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, values.as_slice())?;
        Ok(id)
    }

    /// Overwrites a row's entity columns and timestamps with a server
    /// version, clearing any tombstone and marking it synced.
    pub fn overwrite(&self, conn: &Connection, id: &str, record: &LocalRecord) -> StoreResult<()> {
        self.check_columns(record)?;

        let mut assignments = vec![
            "created_at = ?1".to_string(),
            "updated_at = ?2".to_string(),
            "deleted_at = NULL".to_string(),
            "sync_status = 'synced'".to_string(),
        ];
        let mut values: Vec<&dyn ToSql> =
            vec![&record.created_at as &dyn ToSql, &record.updated_at];
        for (name, value) in &record.columns {
            values.push(value);
            assignments.push(format!("{} = ?{}", name, values.len()));
        }
        values.push(&id);

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.name(),
            assignments.join(", "),
            values.len()
        );
        let changed = conn.execute(&sql, values.as_slice())?;
        if changed == 0 {
            return Err(StoreError::not_found(self.name(), id));
        }
        Ok(())
    }

    /// Tombstones a live row. Returns false if it was already tombstoned.
    pub fn tombstone(&self, conn: &Connection, id: &str, deleted_at: i64) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            self.name()
        );
        Ok(conn.execute(&sql, params![deleted_at, id])? > 0)
    }

    /// Counts live rows, or every row when `include_deleted` is set.
    pub fn count(&self, conn: &Connection, include_deleted: bool) -> StoreResult<usize> {
        let filter = if include_deleted {
            ""
        } else {
            " WHERE deleted_at IS NULL"
        };
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.name(), filter);
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Lists live rows in creation order.
    pub fn list(&self, conn: &Connection) -> StoreResult<Vec<StoredRow>> {
        self.select_where(conn, "deleted_at IS NULL ORDER BY created_at, id", &[])
    }

    /// Lists rows carrying a local change awaiting push, oldest change first.
    pub fn pending(&self, conn: &Connection) -> StoreResult<Vec<StoredRow>> {
        self.select_where(conn, "sync_status != 'synced' ORDER BY updated_at, id", &[])
    }

    /// Marks pushed rows as synced.
    ///
    /// Each entry is `(local id, local_version as read before the push)`. A
    /// row whose version moved since then was changed during the push and
    /// stays pending. Returns the number of rows acknowledged.
    pub fn acknowledge(&self, conn: &Connection, rows: &[(String, i64)]) -> StoreResult<usize> {
        let sql = format!(
            "UPDATE {} SET sync_status = 'synced' \
             WHERE id = ?1 AND local_version = ?2 AND sync_status != 'synced'",
            self.name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut acknowledged = 0;
        for (id, version) in rows {
            acknowledged += stmt.execute(params![id, version])?;
        }
        Ok(acknowledged)
    }
}
