//! Locally originated favorites.
//!
//! Favorites are the one replicated table the device writes to. Every
//! mutation leaves the row with a pending `sync_status` until the push
//! phase acknowledges it.

use crate::database::Database;
use crate::error::{StoreError, StoreResult};
use crate::record::{now_millis, LocalRecord, StoredRow, SyncStatus};
use crate::schema::Collection;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::Arc;

const COLLECTION: Collection = Collection::FAVORITES;

/// A live favorite of the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Favorite {
    /// Server id of the favorite row.
    pub server_id: String,
    /// Server id of the product.
    pub product_id: String,
    /// When the product was favorited, in epoch milliseconds.
    pub created_at: i64,
    /// True while the favorite has not been pushed.
    pub pending: bool,
}

impl Favorite {
    fn from_row(row: &StoredRow) -> Self {
        Self {
            server_id: row.server_id.clone(),
            product_id: row.text("product_server_id").unwrap_or_default().to_string(),
            created_at: row.created_at,
            pending: row.sync_status.is_pending(),
        }
    }
}

/// Favorites API over the local store.
#[derive(Debug, Clone)]
pub struct Favorites {
    db: Arc<Database>,
}

impl Favorites {
    /// Creates the favorites API.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Toggles a product in the user's favorites. Returns the new state.
    ///
    /// - no row: a new row is inserted as `created`
    /// - live row: it is tombstoned as `deleted`
    /// - tombstoned row: it is revived as `updated`
    ///
    /// A row is never removed here, even if it was not pushed yet: a push
    /// may already have sent it, and only a pending tombstone tells the
    /// backend to drop it again. Every change bumps `local_version`.
    pub fn toggle(&self, user_id: &str, product_id: &str) -> StoreResult<bool> {
        if user_id.is_empty() || product_id.is_empty() {
            return Err(StoreError::InvalidArgument(
                "user id and product id must not be empty".into(),
            ));
        }

        let now = now_millis();
        let favorite = self.db.transaction(|txn| match find(txn, user_id, product_id)? {
            None => {
                let record = LocalRecord::new(uuid::Uuid::new_v4().to_string(), now, now)
                    .with("user_server_id", user_id)
                    .with("product_server_id", product_id);
                COLLECTION.insert(txn, &record, SyncStatus::Created)?;
                Ok(true)
            }
            Some(row) if !row.is_deleted() => {
                txn.execute(
                    "UPDATE favorites
                     SET deleted_at = ?1, updated_at = ?1, sync_status = 'deleted',
                         local_version = local_version + 1
                     WHERE id = ?2",
                    params![now, row.id],
                )?;
                Ok(false)
            }
            Some(row) => {
                txn.execute(
                    "UPDATE favorites
                     SET deleted_at = NULL, updated_at = ?1, sync_status = 'updated',
                         local_version = local_version + 1
                     WHERE id = ?2",
                    params![now, row.id],
                )?;
                Ok(true)
            }
        })?;

        tracing::debug!(user_id, product_id, favorite, "favorite toggled");
        Ok(favorite)
    }

    /// Returns true if the product is a live favorite of the user.
    pub fn is_favorite(&self, user_id: &str, product_id: &str) -> StoreResult<bool> {
        self.db.read(|conn| {
            Ok(find(conn, user_id, product_id)?.is_some_and(|row| !row.is_deleted()))
        })
    }

    /// Lists the user's live favorites, oldest first.
    pub fn list(&self, user_id: &str) -> StoreResult<Vec<Favorite>> {
        let rows = self.db.read(|conn| {
            COLLECTION.select_where(
                conn,
                "user_server_id = ?1 AND deleted_at IS NULL ORDER BY created_at, id",
                &[&user_id],
            )
        })?;
        Ok(rows.iter().map(Favorite::from_row).collect())
    }
}

/// Finds the user's row for a product, preferring a live one.
fn find(conn: &Connection, user_id: &str, product_id: &str) -> StoreResult<Option<StoredRow>> {
    let rows = COLLECTION.select_where(
        conn,
        "user_server_id = ?1 AND product_server_id = ?2
         ORDER BY deleted_at IS NULL DESC, updated_at DESC LIMIT 1",
        &[&user_id, &product_id],
    )?;
    Ok(rows.into_iter().next())
}
