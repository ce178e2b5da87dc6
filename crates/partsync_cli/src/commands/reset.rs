//! `reset` command: forget cursors so the next pull starts from scratch.

use crate::error::CliResult;
use partsync_protocol::SyncableTable;
use partsync_store::{CursorStore, Database};
use std::sync::Arc;

/// Resets the cursors of `tables`, or every cursor when empty.
/// Returns how many cursors were removed.
pub fn run(db: &Arc<Database>, tables: &[SyncableTable]) -> CliResult<usize> {
    let cursors = CursorStore::new(Arc::clone(db));
    let removed = if tables.is_empty() {
        cursors.reset_all()?
    } else {
        let mut removed = 0;
        for table in tables {
            if cursors.reset(*table)? {
                removed += 1;
            }
        }
        removed
    };

    tracing::info!(removed, "cursors reset");
    println!("reset {removed} cursor(s); the next pull re-fetches those tables");
    Ok(removed)
}
