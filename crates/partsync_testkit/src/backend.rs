//! In-process fake of the storefront backend's sync endpoints.
//!
//! Keeps one document map per table with millisecond timestamps from a
//! logical clock, answers `/sync/pull` the way the real backend does, and
//! accepts `/sync/push` for pushable tables. Plug it into an engine through
//! [`LoopbackClient`](partsync_engine::LoopbackClient).

use parking_lot::{Mutex, RwLock};
use partsync_engine::{descriptor, timestamp_value, HttpResponse, LoopbackServer};
use partsync_protocol::{
    PullRequest, PullResponse, PushRequest, RemoteRecord, SyncableTable, TableChanges,
};
use std::collections::{BTreeMap, HashMap};

/// Clock start: 2023-11-14T22:13:20Z.
const EPOCH_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
struct Document {
    record: RemoteRecord,
    created_at: i64,
    updated_at: i64,
    deleted_at: Option<i64>,
}

impl Document {
    fn stamped(&self) -> RemoteRecord {
        self.record
            .clone()
            .with("created_at", timestamp_value(self.created_at))
            .with("updated_at", timestamp_value(self.updated_at))
    }
}

#[derive(Debug, Default)]
struct BackendState {
    now: i64,
    tables: HashMap<SyncableTable, BTreeMap<String, Document>>,
}

impl BackendState {
    fn tick(&mut self) -> i64 {
        self.now += 1;
        self.now
    }

    fn upsert(&mut self, table: SyncableTable, record: RemoteRecord) -> Option<i64> {
        let id = record.id()?.to_string();
        let now = self.tick();
        let docs = self.tables.entry(table).or_default();
        match docs.get_mut(&id) {
            Some(doc) => {
                doc.record = record;
                doc.updated_at = now;
                doc.deleted_at = None;
            }
            None => {
                docs.insert(
                    id,
                    Document {
                        record,
                        created_at: now,
                        updated_at: now,
                        deleted_at: None,
                    },
                );
            }
        }
        Some(now)
    }

    fn delete(&mut self, table: SyncableTable, id: &str) -> bool {
        let now = self.tick();
        match self.tables.get_mut(&table).and_then(|docs| docs.get_mut(id)) {
            Some(doc) if doc.deleted_at.is_none() => {
                doc.deleted_at = Some(now);
                doc.updated_at = now;
                true
            }
            _ => false,
        }
    }

    fn changes_since(&self, table: SyncableTable, since: i64) -> TableChanges {
        let mut changes = TableChanges::new();
        let Some(docs) = self.tables.get(&table) else {
            return changes;
        };

        for (id, doc) in docs {
            if doc.updated_at <= since {
                continue;
            }
            match doc.deleted_at {
                Some(_) if since > 0 => changes.deleted.push(id.clone()),
                Some(_) => {}
                None if doc.created_at > since => changes.created.push(doc.stamped()),
                None => changes.updated.push(doc.stamped()),
            }
        }
        changes
    }
}

/// A scripted failure: respond with `status` to the next `remaining` requests.
#[derive(Debug, Clone, Copy)]
struct Outage {
    status: u16,
    remaining: usize,
}

/// Fake sync backend.
///
/// # Example
///
/// ```rust,ignore
/// let backend = Arc::new(FakeBackend::new());
/// backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
/// let engine = loopback_engine(Arc::clone(&backend), db);
/// ```
#[derive(Debug)]
pub struct FakeBackend {
    state: RwLock<BackendState>,
    outage: Mutex<Option<Outage>>,
    pulls: Mutex<Vec<PullRequest>>,
    pushes: Mutex<Vec<PushRequest>>,
}

impl FakeBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BackendState {
                now: EPOCH_MS,
                tables: HashMap::new(),
            }),
            outage: Mutex::new(None),
            pulls: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
        }
    }

    /// Creates or replaces a document; timestamps are assigned by the
    /// backend. Returns the new `updated_at`, or `None` if the record has no id.
    pub fn upsert(&self, table: SyncableTable, record: RemoteRecord) -> Option<i64> {
        self.state.write().upsert(table, record)
    }

    /// Soft-deletes a document. Returns false if it was absent or already deleted.
    pub fn delete(&self, table: SyncableTable, id: &str) -> bool {
        self.state.write().delete(table, id)
    }

    /// Returns the current clock value.
    pub fn now(&self) -> i64 {
        self.state.read().now
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: i64) {
        self.state.write().now += millis;
    }

    /// Returns live documents of a table.
    pub fn live(&self, table: SyncableTable) -> Vec<RemoteRecord> {
        self.state
            .read()
            .tables
            .get(&table)
            .map(|docs| {
                docs.values()
                    .filter(|d| d.deleted_at.is_none())
                    .map(Document::stamped)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Answers the next `count` requests with `status`.
    pub fn fail_next(&self, count: usize, status: u16) {
        *self.outage.lock() = Some(Outage {
            status,
            remaining: count,
        });
    }

    /// Returns the pull requests received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Returns the number of pull requests received so far.
    pub fn pull_count(&self) -> usize {
        self.pulls.lock().len()
    }

    /// Returns the accepted push requests.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    fn take_outage(&self) -> Option<u16> {
        let mut outage = self.outage.lock();
        let current = outage.as_mut()?;
        let status = current.status;
        current.remaining = current.remaining.saturating_sub(1);
        if current.remaining == 0 {
            *outage = None;
        }
        Some(status)
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> PullResponse {
        let tables = if request.tables.is_empty() {
            SyncableTable::DEFAULT_PULL.to_vec()
        } else {
            request.tables.clone()
        };

        let mut state = self.state.write();
        let timestamp = state.tick();
        let mut response = PullResponse::new(timestamp);
        for table in tables {
            let changes = state.changes_since(table, request.last_pulled_at);
            response = response.with_table(table, changes);
        }
        drop(state);

        self.pulls.lock().push(request);
        response
    }

    /// Handles a push request. Non-pushable tables are rejected as a whole.
    pub fn handle_push(&self, request: PushRequest) -> Result<(), String> {
        let mut resolved = Vec::with_capacity(request.changes.len());
        for name in request.changes.keys() {
            match SyncableTable::from_name(name) {
                Some(table) if descriptor(table).pushable => resolved.push(table),
                _ => return Err(format!("table {name} does not accept pushes")),
            }
        }

        let mut state = self.state.write();
        for (table, changes) in resolved.into_iter().zip(request.changes.values()) {
            for record in changes.created.iter().chain(&changes.updated) {
                state.upsert(table, strip_timestamps(record));
            }
            for id in &changes.deleted {
                state.delete(table, id);
            }
        }
        drop(state);

        self.pushes.lock().push(request);
        Ok(())
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_timestamps(record: &RemoteRecord) -> RemoteRecord {
    let mut fields = record.fields().clone();
    fields.remove("created_at");
    fields.remove("updated_at");
    RemoteRecord::from_map(fields)
}

fn json_error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::with_status(status, serde_json::json!({ "detail": message }).to_string())
}

impl LoopbackServer for FakeBackend {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        if let Some(status) = self.take_outage() {
            tracing::debug!(path, status, "fake backend outage");
            return json_error(status, "service unavailable");
        }

        match path {
            "/sync/pull" => match PullRequest::decode(body) {
                Ok(request) => match self.handle_pull(request).encode() {
                    Ok(body) => HttpResponse::ok(body),
                    Err(e) => json_error(500, &e.to_string()),
                },
                Err(e) => json_error(422, &e.to_string()),
            },
            "/sync/push" => match PushRequest::decode(body) {
                Ok(request) => match self.handle_push(request) {
                    Ok(()) => HttpResponse::ok(br#"{"status":"ok"}"#.to_vec()),
                    Err(message) => json_error(403, &message),
                },
                Err(e) => json_error(422, &e.to_string()),
            },
            _ => json_error(404, "not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{car_brand, favorite};

    fn pull(backend: &FakeBackend, since: i64) -> PullResponse {
        backend.handle_pull(PullRequest::new(since, vec![SyncableTable::CarBrands]))
    }

    #[test]
    fn first_pull_returns_everything_as_created() {
        let backend = FakeBackend::new();
        backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
        backend.upsert(SyncableTable::CarBrands, car_brand("cb2", "Kia"));

        let response = pull(&backend, 0);
        let changes = response.table(SyncableTable::CarBrands).unwrap();
        assert_eq!(changes.created.len(), 2);
        assert!(changes.updated.is_empty());
        assert!(response.timestamp > EPOCH_MS);
        assert!(changes.created[0].get("updated_at").is_some());
    }

    #[test]
    fn incremental_pull_classifies_changes() {
        let backend = FakeBackend::new();
        backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota"));
        backend.upsert(SyncableTable::CarBrands, car_brand("cb2", "Kia"));
        let since = pull(&backend, 0).timestamp;

        backend.upsert(SyncableTable::CarBrands, car_brand("cb1", "Toyota Motors"));
        backend.upsert(SyncableTable::CarBrands, car_brand("cb3", "Honda"));
        assert!(backend.delete(SyncableTable::CarBrands, "cb2"));

        let response = pull(&backend, since);
        let changes = response.table(SyncableTable::CarBrands).unwrap();
        assert_eq!(changes.created[0].id(), Some("cb3"));
        assert_eq!(changes.updated[0].id(), Some("cb1"));
        assert_eq!(changes.deleted, vec!["cb2".to_string()]);

        assert!(pull(&backend, response.timestamp)
            .table(SyncableTable::CarBrands)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn empty_table_list_uses_default_tables() {
        let backend = FakeBackend::new();
        let response = backend.handle_pull(PullRequest::new(0, vec![]));
        assert_eq!(response.changes.len(), SyncableTable::DEFAULT_PULL.len());
    }

    #[test]
    fn push_only_accepts_pushable_tables() {
        let backend = FakeBackend::new();
        let ok = PushRequest::new().with_table(
            SyncableTable::Favorites,
            TableChanges::new().with_created(favorite("f1", "u1", "p1")),
        );
        backend.handle_push(ok).unwrap();
        assert_eq!(backend.live(SyncableTable::Favorites).len(), 1);

        let rejected = PushRequest::new().with_table(
            SyncableTable::Products,
            TableChanges::new().with_created(RemoteRecord::new("p1")),
        );
        assert!(backend.handle_push(rejected).is_err());
        assert_eq!(backend.push_requests().len(), 1);
    }

    #[test]
    fn outage_answers_with_status() {
        let backend = FakeBackend::new();
        backend.fail_next(1, 503);

        let body = PullRequest::new(0, vec![]).encode().unwrap();
        assert_eq!(backend.handle_post("/sync/pull", &body).status, 503);
        assert_eq!(backend.handle_post("/sync/pull", &body).status, 200);
        assert_eq!(backend.handle_post("/sync/other", &body).status, 404);
        assert_eq!(backend.handle_post("/sync/pull", b"{").status, 422);
    }
}
