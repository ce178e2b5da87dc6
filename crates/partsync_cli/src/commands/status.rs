//! `status` command: cursors, row counts and pending changes.

use super::{print_json, Format};
use crate::error::CliResult;
use partsync_engine::descriptor;
use partsync_protocol::SyncableTable;
use partsync_store::{Cart, Collection, CursorStore, Database};
use serde::Serialize;
use std::sync::Arc;

/// State of one replicated table.
#[derive(Debug, Serialize)]
pub struct TableStatus {
    /// Wire name.
    pub table: String,
    /// Live rows.
    pub rows: usize,
    /// Rows including tombstones.
    pub total: usize,
    /// Rows awaiting push.
    pub pending: usize,
    /// Stored cursor, 0 if never pulled.
    pub last_pulled_at: i64,
}

/// Local store status.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Database file.
    pub path: Option<String>,
    /// Recorded schema version.
    pub schema_version: i32,
    /// Per-table state.
    pub tables: Vec<TableStatus>,
    /// Local cart lines.
    pub cart_items: usize,
}

/// Collects the status of `db`.
pub fn collect(db: &Arc<Database>) -> CliResult<StatusReport> {
    let cursors = CursorStore::new(Arc::clone(db));
    let mut tables = Vec::with_capacity(SyncableTable::ALL.len());

    for table in SyncableTable::ALL {
        let collection = Collection::for_table(table);
        let pending = if descriptor(table).pushable {
            db.pending(collection)?.len()
        } else {
            0
        };
        tables.push(TableStatus {
            table: table.to_string(),
            rows: db.count(collection)?,
            total: db.read(|conn| collection.count(conn, true))?,
            pending,
            last_pulled_at: cursors.get(table)?,
        });
    }

    Ok(StatusReport {
        path: db.path().map(|p| p.display().to_string()),
        schema_version: db.schema_version()?,
        tables,
        cart_items: Cart::new(Arc::clone(db)).list()?.len(),
    })
}

/// Runs the status command.
pub fn run(db: &Arc<Database>, format: Format) -> CliResult<StatusReport> {
    let report = collect(db)?;
    match format {
        Format::Json => print_json(&report)?,
        Format::Text => {
            println!("database: {}", report.path.as_deref().unwrap_or("(memory)"));
            println!("schema version: {}", report.schema_version);
            println!(
                "{:<16} {:>8} {:>8} {:>8} {:>16}",
                "table", "rows", "total", "pending", "last_pulled_at"
            );
            for t in &report.tables {
                println!(
                    "{:<16} {:>8} {:>8} {:>8} {:>16}",
                    t.table, t.rows, t.total, t.pending, t.last_pulled_at
                );
            }
            println!("cart items: {}", report.cart_items);
        }
    }
    Ok(report)
}
