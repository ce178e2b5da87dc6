//! Builders for backend-shaped records.
//!
//! Records come without `created_at`/`updated_at`; [`FakeBackend`](crate::FakeBackend)
//! stamps them. Use [`stamped`] when feeding a transport directly.

use partsync_engine::timestamp_value;
use partsync_protocol::RemoteRecord;
use serde_json::json;

/// Adds both timestamps to a record.
pub fn stamped(record: RemoteRecord, created_at: i64, updated_at: i64) -> RemoteRecord {
    record
        .with("created_at", timestamp_value(created_at))
        .with("updated_at", timestamp_value(updated_at))
}

/// A car brand.
pub fn car_brand(id: &str, name: &str) -> RemoteRecord {
    RemoteRecord::new(id)
        .with("name", name)
        .with("name_ar", format!("{name} (ar)"))
        .with("logo", serde_json::Value::Null)
}

/// A car model of a brand.
pub fn car_model(id: &str, brand_id: &str, name: &str) -> RemoteRecord {
    RemoteRecord::new(id)
        .with("brand_id", brand_id)
        .with("name", name)
        .with("year_start", 2015)
        .with("year_end", 2023)
        .with("variants", json!(["base", "sport"]))
}

/// A category.
pub fn category(id: &str, name: &str, sort_order: i64) -> RemoteRecord {
    RemoteRecord::new(id)
        .with("name", name)
        .with("icon", "engine")
        .with("sort_order", sort_order)
}

/// A product.
pub fn product(id: &str, name: &str, price: f64) -> RemoteRecord {
    RemoteRecord::new(id)
        .with("name", name)
        .with("price", price)
        .with("sku", format!("SKU-{id}"))
        .with("images", json!([]))
        .with("car_model_ids", json!([]))
        .with("stock_quantity", 10)
        .with("hidden_status", false)
}

/// A favorite.
pub fn favorite(id: &str, user_id: &str, product_id: &str) -> RemoteRecord {
    RemoteRecord::new(id)
        .with("user_id", user_id)
        .with("product_id", product_id)
}
