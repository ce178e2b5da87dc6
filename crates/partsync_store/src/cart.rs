//! Local-only cart rows.
//!
//! Cart items are never pulled, pushed or touched by a sync; they live in
//! their own table without a server id.

use crate::database::Database;
use crate::error::{StoreError, StoreResult};
use crate::record::now_millis;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;

const SELECT: &str = "SELECT id, product_server_id, quantity, added_at, updated_at FROM cart_items";

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    /// Local id.
    pub id: String,
    /// Server id of the product.
    pub product_server_id: String,
    /// Quantity (always positive).
    pub quantity: u32,
    /// When the product was first added, in epoch milliseconds.
    pub added_at: i64,
    /// Last change, in epoch milliseconds.
    pub updated_at: i64,
}

impl CartItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_server_id: row.get(1)?,
            quantity: row.get(2)?,
            added_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

/// Cart API over the local store.
#[derive(Debug, Clone)]
pub struct Cart {
    db: Arc<Database>,
}

impl Cart {
    /// Creates the cart API.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Adds a product. Adding a product already in the cart merges the
    /// quantities into its existing line.
    pub fn add(&self, product_id: &str, quantity: u32) -> StoreResult<CartItem> {
        if product_id.is_empty() {
            return Err(StoreError::InvalidArgument("product id must not be empty".into()));
        }
        if quantity == 0 {
            return Err(StoreError::InvalidArgument("quantity must be positive".into()));
        }

        let now = now_millis();
        let id = uuid::Uuid::new_v4().to_string();
        self.db.transaction(|txn| {
            txn.execute(
                "INSERT INTO cart_items (id, product_server_id, quantity, added_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(product_server_id) DO UPDATE
                 SET quantity = quantity + excluded.quantity, updated_at = excluded.updated_at",
                params![id, product_id, quantity, now],
            )?;
            find(txn, product_id)?.ok_or_else(|| StoreError::not_found("cart_items", product_id))
        })
    }

    /// Sets the quantity of a line. A quantity of zero removes the line and
    /// returns `None`.
    pub fn set_quantity(&self, product_id: &str, quantity: u32) -> StoreResult<Option<CartItem>> {
        if quantity == 0 {
            return if self.remove(product_id)? {
                Ok(None)
            } else {
                Err(StoreError::not_found("cart_items", product_id))
            };
        }

        let now = now_millis();
        self.db.transaction(|txn| {
            let changed = txn.execute(
                "UPDATE cart_items SET quantity = ?1, updated_at = ?2 WHERE product_server_id = ?3",
                params![quantity, now, product_id],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("cart_items", product_id));
            }
            find(txn, product_id)
        })
    }

    /// Removes a product from the cart. Returns false if it was not there.
    pub fn remove(&self, product_id: &str) -> StoreResult<bool> {
        let removed = self.db.transaction(|txn| {
            Ok(txn.execute(
                "DELETE FROM cart_items WHERE product_server_id = ?1",
                params![product_id],
            )?)
        })?;
        Ok(removed > 0)
    }

    /// Lists the cart in the order products were added.
    pub fn list(&self) -> StoreResult<Vec<CartItem>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT} ORDER BY added_at, id"))?;
            let items = stmt
                .query_map([], CartItem::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
    }

    /// Empties the cart. Returns the number of lines removed.
    pub fn clear(&self) -> StoreResult<usize> {
        self.db
            .transaction(|txn| Ok(txn.execute("DELETE FROM cart_items", [])?))
    }
}

fn find(conn: &Connection, product_id: &str) -> StoreResult<Option<CartItem>> {
    let item = conn
        .query_row(
            &format!("{SELECT} WHERE product_server_id = ?1"),
            params![product_id],
            CartItem::from_row,
        )
        .optional()?;
    Ok(item)
}
