//! Remote record representation.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One row as the backend sends it.
///
/// The record is an opaque field bag: it stays untyped until the change
/// mapper reads the fields it declares for the record's table. This keeps a
/// single malformed record from failing the decode of a whole pull response.
/// A non-object entry decodes to an empty record, which the mapper then
/// rejects for lack of an `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RemoteRecord {
    fields: Map<String, Value>,
}

impl RemoteRecord {
    /// Creates a record with only an `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".into(), Value::String(id.into()));
        Self { fields }
    }

    /// Wraps an existing JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Sets a field, returning the record (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns the backend identifier, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// Returns a raw field value. JSON `null` is reported as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Returns all fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl<'de> Deserialize<'de> for RemoteRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = match Value::deserialize(deserializer)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self { fields })
    }
}
