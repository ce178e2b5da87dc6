//! Protocol messages for sync.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::RemoteRecord;
use crate::table::SyncableTable;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Changes keyed by table wire name.
///
/// Keys stay strings so that a response naming a table this client does not
/// know still decodes; the engine skips such entries.
pub type ChangeMap = BTreeMap<String, TableChanges>;

/// The created/updated/deleted triple for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChanges {
    /// Records that were created since the watermark.
    #[serde(default)]
    pub created: Vec<RemoteRecord>,
    /// Records that were updated since the watermark.
    #[serde(default)]
    pub updated: Vec<RemoteRecord>,
    /// Server ids of records deleted since the watermark.
    #[serde(default, deserialize_with = "deleted_ids")]
    pub deleted: Vec<String>,
}

/// Keeps the string entries of a `deleted` list; anything else is dropped
/// so one bad id cannot fail the whole response.
fn deleted_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<Vec<Value>>::deserialize(deserializer)? {
        Some(entries) => entries,
        None => return Ok(Vec::new()),
    };
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::String(id) => ids.push(id),
            other => tracing::warn!(entry = %other, "dropping non-string deleted id"),
        }
    }
    Ok(ids)
}

impl TableChanges {
    /// Creates an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a created record (builder style).
    pub fn with_created(mut self, record: RemoteRecord) -> Self {
        self.created.push(record);
        self
    }

    /// Adds an updated record (builder style).
    pub fn with_updated(mut self, record: RemoteRecord) -> Self {
        self.updated.push(record);
        self
    }

    /// Adds a deleted server id (builder style).
    pub fn with_deleted(mut self, server_id: impl Into<String>) -> Self {
        self.deleted.push(server_id.into());
        self
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Returns true if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pull request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Watermark in epoch milliseconds; `0` pulls everything.
    pub last_pulled_at: i64,
    /// Tables to pull.
    pub tables: Vec<SyncableTable>,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(last_pulled_at: i64, tables: Vec<SyncableTable>) -> Self {
        Self {
            last_pulled_at,
            tables,
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| ProtocolError::Encode {
            message: "pull request",
            source,
        })
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| ProtocolError::Decode {
            message: "pull request",
            source,
        })
    }
}

/// Pull response from server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Server time of the pull, in epoch milliseconds. Becomes the new
    /// cursor of every requested table once the changes are applied.
    pub timestamp: i64,
    /// Changes per table.
    #[serde(default)]
    pub changes: ChangeMap,
}

impl PullResponse {
    /// Creates an empty response at the given server time.
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            changes: ChangeMap::new(),
        }
    }

    /// Sets the changes for a table (builder style).
    pub fn with_table(mut self, table: SyncableTable, changes: TableChanges) -> Self {
        self.changes.insert(table.as_str().to_string(), changes);
        self
    }

    /// Returns the changes reported for a table.
    pub fn table(&self, table: SyncableTable) -> Option<&TableChanges> {
        self.changes.get(table.as_str())
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| ProtocolError::Encode {
            message: "pull response",
            source,
        })
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| ProtocolError::Decode {
            message: "pull response",
            source,
        })
    }
}

/// Push request from client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Locally originated changes per table.
    pub changes: ChangeMap,
}

impl PushRequest {
    /// Creates an empty push request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the changes for a table (builder style).
    pub fn with_table(mut self, table: SyncableTable, changes: TableChanges) -> Self {
        self.changes.insert(table.as_str().to_string(), changes);
        self
    }

    /// Returns true if no table carries a change.
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(TableChanges::is_empty)
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| ProtocolError::Encode {
            message: "push request",
            source,
        })
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| ProtocolError::Decode {
            message: "push request",
            source,
        })
    }
}
