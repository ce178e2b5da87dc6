//! Local schema: replicated collections, cursors and cart rows.
//!
//! Every replicated collection shares the same bookkeeping columns
//! (`id`, `server_id`, `created_at`, `updated_at`, `deleted_at`,
//! `sync_status`, `local_version`) and adds its own entity columns in local naming.
//! The DDL is generated from the column lists below, so the declared
//! columns and the created tables cannot drift apart.

use crate::error::StoreResult;
use partsync_protocol::SyncableTable;
use rusqlite::Connection;
use std::fmt::Write as _;

/// Schema version recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 2;

/// Bookkeeping columns present on every replicated collection, in select order.
pub const SYSTEM_COLUMNS: [&str; 7] = [
    "id",
    "server_id",
    "created_at",
    "updated_at",
    "deleted_at",
    "sync_status",
    "local_version",
];

const CORE_SQL: &str = "
CREATE TABLE IF NOT EXISTS sync_cursors (
    table_name TEXT PRIMARY KEY NOT NULL,
    last_pulled_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cart_items (
    id TEXT PRIMARY KEY NOT NULL,
    product_server_id TEXT NOT NULL UNIQUE,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    added_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// SQLite storage class of an entity column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UTF-8 text (also used for JSON-encoded arrays and objects).
    Text,
    /// 64-bit integer (also used for booleans stored as 0/1).
    Integer,
    /// 64-bit float.
    Real,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// An entity column of a replicated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    /// Local column name.
    pub name: &'static str,
    /// Storage class.
    pub ty: ColumnType,
}

impl Column {
    const fn text(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Text,
        }
    }

    const fn integer(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Integer,
        }
    }

    const fn real(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Real,
        }
    }
}

/// Handle to one replicated local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Collection {
    name: &'static str,
    columns: &'static [Column],
}

impl Collection {
    /// Vehicle manufacturers.
    pub const CAR_BRANDS: Collection = Collection {
        name: "car_brands",
        columns: &[
            Column::text("name"),
            Column::text("name_ar"),
            Column::text("logo"),
            Column::text("distributor_server_id"),
        ],
    };

    /// Vehicle models.
    pub const CAR_MODELS: Collection = Collection {
        name: "car_models",
        columns: &[
            Column::text("brand_server_id"),
            Column::text("name"),
            Column::text("name_ar"),
            Column::integer("year_start"),
            Column::integer("year_end"),
            Column::text("image_url"),
            Column::text("description"),
            Column::text("description_ar"),
            Column::text("variants_json"),
        ],
    };

    /// Part manufacturers.
    pub const PRODUCT_BRANDS: Collection = Collection {
        name: "product_brands",
        columns: &[
            Column::text("name"),
            Column::text("name_ar"),
            Column::text("logo"),
            Column::text("country_of_origin"),
            Column::text("country_of_origin_ar"),
            Column::text("supplier_server_id"),
        ],
    };

    /// Catalog categories.
    pub const CATEGORIES: Collection = Collection {
        name: "categories",
        columns: &[
            Column::text("name"),
            Column::text("name_ar"),
            Column::text("parent_server_id"),
            Column::text("icon"),
            Column::text("image_data"),
            Column::integer("sort_order"),
        ],
    };

    /// Catalog products.
    pub const PRODUCTS: Collection = Collection {
        name: "products",
        columns: &[
            Column::text("name"),
            Column::text("name_ar"),
            Column::text("description"),
            Column::text("description_ar"),
            Column::real("price"),
            Column::text("sku"),
            Column::text("product_brand_server_id"),
            Column::text("category_server_id"),
            Column::text("image_url"),
            Column::text("images_json"),
            Column::text("car_model_server_ids_json"),
            Column::integer("stock_quantity"),
            Column::integer("is_hidden"),
            Column::text("added_by_admin_server_id"),
        ],
    };

    /// Per-user favorite products.
    pub const FAVORITES: Collection = Collection {
        name: "favorites",
        columns: &[
            Column::text("user_server_id"),
            Column::text("product_server_id"),
        ],
    };

    /// Marketing promotions.
    pub const PROMOTIONS: Collection = Collection {
        name: "promotions",
        columns: &[
            Column::text("title"),
            Column::text("title_ar"),
            Column::text("image"),
            Column::text("promotion_type"),
            Column::integer("is_active"),
            Column::text("target_product_server_id"),
            Column::text("target_car_model_server_id"),
            Column::integer("sort_order"),
        ],
    };

    /// Discounted product bundles.
    pub const BUNDLE_OFFERS: Collection = Collection {
        name: "bundle_offers",
        columns: &[
            Column::text("name"),
            Column::text("name_ar"),
            Column::text("description"),
            Column::text("description_ar"),
            Column::real("discount_percentage"),
            Column::text("target_car_model_server_id"),
            Column::text("product_server_ids_json"),
            Column::text("image"),
            Column::integer("is_active"),
        ],
    };

    /// Every replicated collection.
    pub const ALL: [Collection; 8] = [
        Collection::CAR_BRANDS,
        Collection::CAR_MODELS,
        Collection::PRODUCT_BRANDS,
        Collection::CATEGORIES,
        Collection::PRODUCTS,
        Collection::FAVORITES,
        Collection::PROMOTIONS,
        Collection::BUNDLE_OFFERS,
    ];

    /// Returns the local collection backing a replicated table.
    pub const fn for_table(table: SyncableTable) -> Collection {
        match table {
            SyncableTable::CarBrands => Collection::CAR_BRANDS,
            SyncableTable::CarModels => Collection::CAR_MODELS,
            SyncableTable::ProductBrands => Collection::PRODUCT_BRANDS,
            SyncableTable::Categories => Collection::CATEGORIES,
            SyncableTable::Products => Collection::PRODUCTS,
            SyncableTable::Favorites => Collection::FAVORITES,
            SyncableTable::Promotions => Collection::PROMOTIONS,
            SyncableTable::BundleOffers => Collection::BUNDLE_OFFERS,
        }
    }

    /// Returns the table name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the entity columns (bookkeeping columns excluded).
    pub const fn columns(&self) -> &'static [Column] {
        self.columns
    }

    /// Looks up an entity column by name.
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the DDL creating this collection and its `server_id` index.
    pub fn create_sql(&self) -> String {
        let mut sql = String::new();
        let _ = writeln!(sql, "CREATE TABLE IF NOT EXISTS {} (", self.name);
        sql.push_str("    id TEXT PRIMARY KEY NOT NULL,\n");
        sql.push_str("    server_id TEXT NOT NULL,\n");
        for column in self.columns {
            let _ = writeln!(sql, "    {} {},", column.name, column.ty.sql());
        }
        sql.push_str("    created_at INTEGER NOT NULL,\n");
        sql.push_str("    updated_at INTEGER NOT NULL,\n");
        sql.push_str("    deleted_at INTEGER,\n");
        sql.push_str("    sync_status TEXT NOT NULL DEFAULT 'synced',\n");
        sql.push_str("    local_version INTEGER NOT NULL DEFAULT 0\n");
        sql.push_str(");\n");
        let _ = writeln!(
            sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{0}_server_id ON {0}(server_id);",
            self.name
        );
        sql
    }
}

/// Creates every table that does not exist yet and records the schema version.
pub(crate) fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        tracing::warn!(
            found = version,
            supported = SCHEMA_VERSION,
            "database was written by a newer schema"
        );
    }

    let txn = conn.transaction()?;
    txn.execute_batch(CORE_SQL)?;
    for collection in Collection::ALL {
        txn.execute_batch(&collection.create_sql())?;
        // Version 1 tables predate the local change counter.
        if version == 1 {
            txn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN local_version INTEGER NOT NULL DEFAULT 0",
                collection.name
            ))?;
        }
    }
    txn.pragma_update(None, "user_version", version.max(SCHEMA_VERSION))?;
    txn.commit()?;

    tracing::debug!(version = version.max(SCHEMA_VERSION), "schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_a_collection() {
        for table in SyncableTable::ALL {
            assert_eq!(Collection::for_table(table).name(), table.as_str());
        }
    }

    #[test]
    fn column_names_are_unique_and_not_reserved() {
        for collection in Collection::ALL {
            let names: Vec<_> = collection.columns().iter().map(|c| c.name).collect();
            for (i, name) in names.iter().enumerate() {
                assert!(!names[i + 1..].contains(name), "{} repeats {name}", collection.name());
                assert!(!SYSTEM_COLUMNS.contains(name));
            }
        }
    }

    #[test]
    fn create_sql_declares_columns_and_index() {
        let sql = Collection::PRODUCTS.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS products ("));
        assert!(sql.contains("    price REAL,\n"));
        assert!(sql.contains("    is_hidden INTEGER,\n"));
        assert!(sql.contains("idx_products_server_id ON products(server_id)"));
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 10);
    }

    #[test]
    fn version_one_tables_gain_local_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        for collection in Collection::ALL {
            conn.execute_batch(&format!(
                "ALTER TABLE {} DROP COLUMN local_version",
                collection.name()
            ))
            .unwrap();
        }
        conn.pragma_update(None, "user_version", 1).unwrap();

        migrate(&mut conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT COUNT(local_version) FROM favorites", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 0);
        let user_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(user_version, SCHEMA_VERSION);
    }

    #[test]
    fn column_lookup() {
        let column = Collection::CAR_MODELS.column("year_start").unwrap();
        assert_eq!(column.ty, ColumnType::Integer);
        assert!(Collection::CAR_MODELS.column("year").is_none());
    }
}
