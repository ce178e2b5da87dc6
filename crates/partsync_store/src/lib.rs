//! # partsync Store
//!
//! Embedded local store for the partsync replication engine, on SQLite.
//!
//! This crate provides:
//! - `Database`, a mutex-guarded connection with closure transactions
//! - `Collection` handles for every replicated table, with row operations
//!   keyed by `server_id`
//! - `LocalRecord` / `StoredRow` row types and `SyncStatus`
//! - `CursorStore`, the per-table pull watermarks
//! - `Favorites`, the locally originated favorites API
//! - `Cart`, local-only cart rows that replication never touches
//!
//! ## Key Invariants
//!
//! - `server_id` is unique per collection
//! - Cursors never move backwards
//! - Deletions from the server are tombstones (`deleted_at`), not row removals

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cart;
mod collection;
mod cursor;
mod database;
mod error;
mod favorites;
mod record;
mod schema;

pub use cart::{Cart, CartItem};
pub use cursor::{CursorStore, SyncCursor};
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use favorites::{Favorite, Favorites};
pub use record::{ColumnValue, LocalRecord, StoredRow, SyncStatus};
pub use schema::{Collection, Column, ColumnType, SCHEMA_VERSION, SYSTEM_COLUMNS};

pub use rusqlite::{Connection, Transaction};
