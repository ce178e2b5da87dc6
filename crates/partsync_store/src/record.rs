//! Local row types.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Replication status of a local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Row matches the server.
    Synced,
    /// Row was created on this device and not pushed yet.
    Created,
    /// Row was changed on this device and not pushed yet.
    Updated,
    /// Row was tombstoned on this device and not pushed yet.
    Deleted,
}

impl SyncStatus {
    /// Returns the stored text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Deleted => "deleted",
        }
    }

    /// Parses the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(SyncStatus::Synced),
            "created" => Some(SyncStatus::Created),
            "updated" => Some(SyncStatus::Updated),
            "deleted" => Some(SyncStatus::Deleted),
            _ => None,
        }
    }

    /// Returns true if the row carries a local change awaiting push.
    pub fn is_pending(&self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for SyncStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
    }
}

impl FromSql for SyncStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| SyncStatus::parse(s).ok_or(FromSqlError::InvalidType))
    }
}

/// A single entity column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    /// SQL NULL.
    Null,
    /// Integer (booleans are stored as 0/1).
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Text (JSON columns hold their encoded text).
    Text(String),
}

impl ColumnValue {
    /// Returns true for NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Returns the text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ColumnValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the number as a float. Integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ColumnValue::Real(v) => Some(*v),
            ColumnValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the integer as a boolean (`0` is false).
    pub fn as_bool(&self) -> Option<bool> {
        self.as_integer().map(|v| v != 0)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Integer(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Real(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Integer(i64::from(value))
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ColumnValue::Null, Into::into)
    }
}

impl ToSql for ColumnValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            ColumnValue::Null => ValueRef::Null,
            ColumnValue::Integer(v) => ValueRef::Integer(*v),
            ColumnValue::Real(v) => ValueRef::Real(*v),
            ColumnValue::Text(s) => ValueRef::Text(s.as_bytes()),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl FromSql for ColumnValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(ColumnValue::Null),
            ValueRef::Integer(v) => Ok(ColumnValue::Integer(v)),
            ValueRef::Real(v) => Ok(ColumnValue::Real(v)),
            ValueRef::Text(_) => value.as_str().map(|s| ColumnValue::Text(s.to_string())),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// A row ready to be written: the server id, mirrored timestamps and the
/// entity columns in local naming.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Stable reference to the server record.
    pub server_id: String,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
    /// Last modification time in epoch milliseconds.
    pub updated_at: i64,
    /// Entity columns.
    pub columns: BTreeMap<&'static str, ColumnValue>,
}

impl LocalRecord {
    /// Creates a record with no entity columns.
    pub fn new(server_id: impl Into<String>, created_at: i64, updated_at: i64) -> Self {
        Self {
            server_id: server_id.into(),
            created_at,
            updated_at,
            columns: BTreeMap::new(),
        }
    }

    /// Sets a column (builder style).
    pub fn with(mut self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.columns.insert(column, value.into());
        self
    }

    /// Sets a column in place.
    pub fn set(&mut self, column: &'static str, value: impl Into<ColumnValue>) {
        self.columns.insert(column, value.into());
    }

    /// Returns a column value.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }
}

/// A row read back from a replicated collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    /// Local primary key.
    pub id: String,
    /// Stable reference to the server record.
    pub server_id: String,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
    /// Last modification time in epoch milliseconds.
    pub updated_at: i64,
    /// Tombstone time, if the row is deleted.
    pub deleted_at: Option<i64>,
    /// Replication status.
    pub sync_status: SyncStatus,
    /// Counter bumped by every local mutation.
    pub local_version: i64,
    /// Entity columns.
    pub columns: BTreeMap<&'static str, ColumnValue>,
}

impl StoredRow {
    /// Returns true if the row is tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns a column value.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    /// Returns a text column.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(ColumnValue::as_text)
    }
}

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
