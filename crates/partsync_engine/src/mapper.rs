//! Change mapper between backend records and local rows.
//!
//! Conversion is driven entirely by the registry's field maps: fields the
//! map does not declare are dropped, declared fields that are absent or
//! `null` become NULL, and a declared field of the wrong JSON type fails
//! the record (never the batch).

use crate::registry::{descriptor, FieldKind, FieldSpec};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use partsync_protocol::{RemoteRecord, SyncableTable};
use partsync_store::{ColumnValue, LocalRecord, StoredRow};
use serde_json::Value;
use thiserror::Error;

/// Errors converting a single record.
#[derive(Debug, Error)]
pub enum MapError {
    /// The record has no string `id`.
    #[error("record has no id")]
    MissingId,

    /// A mandatory timestamp is absent.
    #[error("record {id}: missing {field}")]
    MissingTimestamp {
        /// Record id.
        id: String,
        /// Timestamp field.
        field: &'static str,
    },

    /// A timestamp could not be parsed.
    #[error("record {id}: invalid timestamp in {field}: {value}")]
    InvalidTimestamp {
        /// Record id.
        id: String,
        /// Timestamp field.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// A declared field holds a value of the wrong type.
    #[error("record {id}: field {field} expected {expected}, found {found}")]
    InvalidField {
        /// Record id.
        id: String,
        /// Field name.
        field: &'static str,
        /// Expected kind.
        expected: &'static str,
        /// Offending value.
        found: String,
    },

    /// A JSON column holds text that is not JSON.
    #[error("row {id}: column {column} holds invalid JSON: {source}")]
    InvalidJson {
        /// Row server id.
        id: String,
        /// Column name.
        column: &'static str,
        /// Parse error.
        source: serde_json::Error,
    },
}

/// Maps a backend record into a local row for `table`.
pub fn map_remote(table: SyncableTable, record: &RemoteRecord) -> Result<LocalRecord, MapError> {
    let id = record
        .id()
        .filter(|id| !id.is_empty())
        .ok_or(MapError::MissingId)?;
    let created_at = required_timestamp(record, id, "created_at")?;
    let updated_at = required_timestamp(record, id, "updated_at")?;

    let mut local = LocalRecord::new(id, created_at, updated_at);
    for field in descriptor(table).fields {
        let value = match record.get(field.remote) {
            Some(value) => to_column(field, value, id)?,
            None => ColumnValue::Null,
        };
        local.set(field.local, value);
    }
    Ok(local)
}

/// Maps a stored row back into a backend record for `table`.
///
/// The local id is never sent: the row's `server_id` becomes the record's
/// `id`, and timestamps are emitted as RFC 3339 UTC.
pub fn map_local(table: SyncableTable, row: &StoredRow) -> Result<RemoteRecord, MapError> {
    let mut record = RemoteRecord::new(row.server_id.clone());
    record.insert("created_at", timestamp_value(row.created_at));
    record.insert("updated_at", timestamp_value(row.updated_at));

    for field in descriptor(table).fields {
        let value = match row.get(field.local) {
            Some(value) => from_column(field, value, &row.server_id)?,
            None => Value::Null,
        };
        record.insert(field.remote, value);
    }
    Ok(record)
}

/// Parses a backend timestamp into epoch milliseconds.
///
/// Accepts RFC 3339 strings, naive ISO-8601 strings (taken as UTC) and
/// integer epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Formats epoch milliseconds as an RFC 3339 UTC string with millisecond
/// precision. Out-of-range values are emitted as plain integers.
pub fn timestamp_value(millis: i64) -> Value {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => Value::from(millis),
    }
}

fn required_timestamp(
    record: &RemoteRecord,
    id: &str,
    field: &'static str,
) -> Result<i64, MapError> {
    let value = record.get(field).ok_or_else(|| MapError::MissingTimestamp {
        id: id.to_string(),
        field,
    })?;
    parse_timestamp(value).ok_or_else(|| MapError::InvalidTimestamp {
        id: id.to_string(),
        field,
        value: value.to_string(),
    })
}

fn to_column(field: &FieldSpec, value: &Value, id: &str) -> Result<ColumnValue, MapError> {
    let converted = match (field.kind, value) {
        (FieldKind::Text, Value::String(s)) => Some(ColumnValue::Text(s.clone())),
        (FieldKind::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(ColumnValue::Integer),
        (FieldKind::Real, Value::Number(n)) => n.as_f64().map(ColumnValue::Real),
        (FieldKind::Bool, Value::Bool(b)) => Some(ColumnValue::from(*b)),
        (FieldKind::Bool, Value::Number(n)) => n.as_i64().map(|v| ColumnValue::from(v != 0)),
        (FieldKind::Json, Value::Array(_) | Value::Object(_)) => {
            Some(ColumnValue::Text(value.to_string()))
        }
        _ => None,
    };

    converted.ok_or_else(|| MapError::InvalidField {
        id: id.to_string(),
        field: field.remote,
        expected: kind_name(field.kind),
        found: value.to_string(),
    })
}

fn from_column(field: &FieldSpec, value: &ColumnValue, id: &str) -> Result<Value, MapError> {
    let converted = match (field.kind, value) {
        (_, ColumnValue::Null) => Some(Value::Null),
        (FieldKind::Text, ColumnValue::Text(s)) => Some(Value::String(s.clone())),
        (FieldKind::Integer, ColumnValue::Integer(v)) => Some(Value::from(*v)),
        (FieldKind::Real, ColumnValue::Real(_) | ColumnValue::Integer(_)) => {
            value.as_real().map(Value::from)
        }
        (FieldKind::Bool, ColumnValue::Integer(v)) => Some(Value::Bool(*v != 0)),
        (FieldKind::Json, ColumnValue::Text(s)) => {
            let parsed = serde_json::from_str(s).map_err(|source| MapError::InvalidJson {
                id: id.to_string(),
                column: field.local,
                source,
            })?;
            Some(parsed)
        }
        _ => None,
    };

    converted.ok_or_else(|| MapError::InvalidField {
        id: id.to_string(),
        field: field.local,
        expected: kind_name(field.kind),
        found: format!("{value:?}"),
    })
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "string",
        FieldKind::Integer => "integer",
        FieldKind::Real => "number",
        FieldKind::Bool => "boolean",
        FieldKind::Json => "array or object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partsync_store::SyncStatus;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record(value: Value) -> RemoteRecord {
        serde_json::from_value(value).unwrap()
    }

    fn stored(local: &LocalRecord) -> StoredRow {
        StoredRow {
            id: "local-1".into(),
            server_id: local.server_id.clone(),
            created_at: local.created_at,
            updated_at: local.updated_at,
            deleted_at: None,
            sync_status: SyncStatus::Synced,
            local_version: 0,
            columns: local.columns.clone(),
        }
    }

    #[test]
    fn maps_product_fields() {
        let remote = record(json!({
            "id": "prod_1",
            "name": "Oil Filter",
            "name_ar": "فلتر زيت",
            "price": 45,
            "sku": "OF-001",
            "product_brand_id": "pb_1",
            "category_id": "cat_1",
            "images": ["a.jpg"],
            "car_model_ids": ["cm_1", "cm_2"],
            "stock_quantity": 12,
            "hidden_status": false,
            "created_at": "2024-01-15T10:30:00.123456",
            "updated_at": "2024-01-15T10:30:00Z",
            "internal_note": "dropped"
        }));

        let local = map_remote(SyncableTable::Products, &remote).unwrap();
        assert_eq!(local.server_id, "prod_1");
        assert_eq!(local.created_at, 1_705_314_600_123);
        assert_eq!(local.updated_at, 1_705_314_600_000);
        assert_eq!(local.get("price"), Some(&ColumnValue::Real(45.0)));
        assert_eq!(local.get("product_brand_server_id"), Some(&ColumnValue::from("pb_1")));
        assert_eq!(
            local.get("car_model_server_ids_json"),
            Some(&ColumnValue::from(r#"["cm_1","cm_2"]"#))
        );
        assert_eq!(local.get("is_hidden"), Some(&ColumnValue::Integer(0)));
        assert_eq!(local.get("description"), Some(&ColumnValue::Null));
        assert!(local.get("internal_note").is_none());
    }

    #[test]
    fn missing_id_and_timestamps() {
        let no_id = record(json!({"name": "x", "created_at": 1, "updated_at": 1}));
        assert!(matches!(
            map_remote(SyncableTable::CarBrands, &no_id),
            Err(MapError::MissingId)
        ));

        let no_ts = record(json!({"id": "cb", "created_at": 1}));
        assert!(matches!(
            map_remote(SyncableTable::CarBrands, &no_ts),
            Err(MapError::MissingTimestamp { field: "updated_at", .. })
        ));

        let bad_ts = record(json!({"id": "cb", "created_at": "yesterday", "updated_at": 1}));
        assert!(matches!(
            map_remote(SyncableTable::CarBrands, &bad_ts),
            Err(MapError::InvalidTimestamp { field: "created_at", .. })
        ));
    }

    #[test]
    fn type_mismatch_fails_record() {
        let remote = record(json!({
            "id": "cm_1",
            "brand_id": "cb_1",
            "year_start": "2019",
            "created_at": 1,
            "updated_at": 1
        }));
        let err = map_remote(SyncableTable::CarModels, &remote).unwrap_err();
        assert!(matches!(err, MapError::InvalidField { field: "year_start", .. }));
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp(&json!(5000)), Some(5000));
        assert_eq!(parse_timestamp(&json!("1970-01-01T00:00:05Z")), Some(5000));
        assert_eq!(parse_timestamp(&json!("1970-01-01T02:00:05+02:00")), Some(5000));
        assert_eq!(parse_timestamp(&json!("1970-01-01T00:00:05")), Some(5000));
        assert_eq!(parse_timestamp(&json!("1970-01-01 00:00:05.5")), Some(5500));
        assert_eq!(parse_timestamp(&json!(true)), None);
        assert_eq!(timestamp_value(5000), json!("1970-01-01T00:00:05.000Z"));
    }

    #[test]
    fn map_local_uses_server_id() {
        let local = LocalRecord::new("fav_1", 1000, 2000)
            .with("user_server_id", "u1")
            .with("product_server_id", "p1");
        let mut row = stored(&local);
        row.id = "local-uuid".into();

        let remote = map_local(SyncableTable::Favorites, &row).unwrap();
        assert_eq!(remote.id(), Some("fav_1"));
        assert_eq!(remote.get("user_id"), Some(&json!("u1")));
        assert_eq!(remote.get("product_id"), Some(&json!("p1")));
        assert_eq!(remote.get("created_at"), Some(&json!("1970-01-01T00:00:01.000Z")));
        assert!(!remote.fields().values().any(|v| v == "local-uuid"));
    }

    #[test]
    fn map_local_rejects_corrupt_json_column() {
        let local = LocalRecord::new("b1", 1, 1).with("product_server_ids_json", "[oops");
        let err = map_local(SyncableTable::BundleOffers, &stored(&local)).unwrap_err();
        assert!(matches!(err, MapError::InvalidJson { column: "product_server_ids_json", .. }));
    }

    fn arb_value(kind: FieldKind) -> BoxedStrategy<Value> {
        let value = match kind {
            FieldKind::Text => "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::from).boxed(),
            FieldKind::Integer => any::<i32>().prop_map(Value::from).boxed(),
            FieldKind::Real => (-1.0e6f64..1.0e6).prop_map(Value::from).boxed(),
            FieldKind::Bool => any::<bool>().prop_map(Value::from).boxed(),
            FieldKind::Json => prop::collection::vec("[a-z0-9_]{1,6}", 0..4)
                .prop_map(|ids| json!(ids))
                .boxed(),
        };
        prop_oneof![1 => Just(Value::Null), 4 => value].boxed()
    }

    fn arb_record(table: SyncableTable) -> impl Strategy<Value = RemoteRecord> {
        let fields: Vec<_> = descriptor(table)
            .fields
            .iter()
            .map(|f| arb_value(f.kind).prop_map(move |v| (f.remote, v)))
            .collect();
        (
            "[a-z0-9]{1,10}",
            0i64..4_102_444_800_000,
            0i64..4_102_444_800_000,
            fields,
        )
            .prop_map(|(id, created, updated, fields)| {
                let mut record = RemoteRecord::new(id)
                    .with("created_at", timestamp_value(created))
                    .with("updated_at", timestamp_value(updated));
                for (name, value) in fields {
                    record.insert(name, value);
                }
                record
            })
    }

    fn arb_table_record() -> impl Strategy<Value = (SyncableTable, RemoteRecord)> {
        prop::sample::select(SyncableTable::ALL.to_vec())
            .prop_flat_map(|table| arb_record(table).prop_map(move |r| (table, r)))
    }

    proptest! {
        #[test]
        fn remote_local_remote_preserves_declared_fields((table, remote) in arb_table_record()) {
            let local = map_remote(table, &remote).unwrap();
            let back = map_local(table, &stored(&local)).unwrap();

            prop_assert_eq!(back.id(), remote.id());
            for name in ["created_at", "updated_at"] {
                prop_assert_eq!(
                    back.get(name).and_then(parse_timestamp),
                    remote.get(name).and_then(parse_timestamp)
                );
            }

            let declared: BTreeMap<_, _> = descriptor(table)
                .fields
                .iter()
                .map(|f| (f.remote, f.kind))
                .collect();
            for (name, kind) in declared {
                let expected = remote.get(name);
                let actual = back.get(name);
                match (kind, expected, actual) {
                    (FieldKind::Real, Some(e), Some(a)) => {
                        prop_assert_eq!(e.as_f64(), a.as_f64());
                    }
                    _ => prop_assert_eq!(expected, actual, "{}.{}", table, name),
                }
            }
        }
    }
}
