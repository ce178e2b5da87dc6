//! Sync engine: pull, apply, advance cursors, push.

use crate::applier::{ApplyReport, ChangeBatch, SyncApplier, TableBatch};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::flight::SingleFlight;
use crate::mapper::{map_local, map_remote};
use crate::registry::{self, descriptor};
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use partsync_protocol::{PullRequest, PullResponse, PushRequest, SyncableTable, TableChanges};
use partsync_store::SyncStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pulling changes from the server.
    Pulling,
    /// Engine is writing pulled changes locally.
    Applying,
    /// Engine is pushing local changes to the server.
    Pushing,
    /// The last operation completed.
    Synced,
    /// The last operation failed.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pulling | SyncState::Applying | SyncState::Pushing
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Successful pull passes.
    pub cycles_completed: u64,
    /// Rows written by pulls.
    pub records_applied: u64,
    /// Records that failed to map or apply.
    pub records_failed: u64,
    /// Successful push requests.
    pub pushes: u64,
    /// Rows sent by successful pushes.
    pub records_pushed: u64,
    /// Calls that received another caller's outcome.
    pub coalesced_calls: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Server timestamp of the last successful pull.
    pub last_timestamp: Option<i64>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of one pull pass.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Whether the pass completed.
    pub success: bool,
    /// Error message on failure.
    pub error: Option<String>,
    /// Whether the failure is worth retrying.
    pub retryable: bool,
    /// Server timestamp now stored as cursor.
    pub timestamp: Option<i64>,
    /// Per-table counts.
    pub report: ApplyReport,
}

impl SyncOutcome {
    fn succeeded(timestamp: i64, report: ApplyReport) -> Self {
        Self {
            success: true,
            error: None,
            retryable: false,
            timestamp: Some(timestamp),
            report,
        }
    }

    fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
            timestamp: None,
            report: ApplyReport::default(),
        }
    }
}

/// Outcome of a push pass.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    /// Whether the pass completed. True when there was nothing to push.
    pub success: bool,
    /// Error message on failure.
    pub error: Option<String>,
    /// Whether the failure is worth retrying.
    pub retryable: bool,
    /// Rows sent.
    pub pushed: usize,
    /// Rows marked synced afterwards.
    pub acknowledged: usize,
    /// Rows that could not be mapped and stay pending.
    pub failed: usize,
}

impl PushOutcome {
    fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
            ..Self::default()
        }
    }
}

/// Result of a full cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleOutcome {
    /// Pull pass.
    pub pull: SyncOutcome,
    /// Push pass; `None` when the pull failed.
    pub push: Option<PushOutcome>,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

impl SyncCycleOutcome {
    /// Returns true if both passes succeeded.
    pub fn success(&self) -> bool {
        self.pull.success && self.push.as_ref().is_some_and(|p| p.success)
    }
}

/// Rows gathered for one pushable table.
struct PendingPush {
    table: SyncableTable,
    changes: TableChanges,
    rows: Vec<(String, i64)>,
    failed: usize,
}

/// The sync engine manages synchronization with the backend.
///
/// Every operation reports failure through its outcome; nothing here
/// panics or returns an error to the host for a failed sync.
pub struct SyncEngine<T: SyncTransport, A: SyncApplier> {
    config: SyncConfig,
    transport: Arc<T>,
    applier: Arc<A>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    pulls: SingleFlight<Vec<SyncableTable>, SyncOutcome>,
    pushes: SingleFlight<(), PushOutcome>,
    exec: Mutex<()>,
}

impl<T: SyncTransport, A: SyncApplier> SyncEngine<T, A> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, applier: A) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            applier: Arc::new(applier),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            pulls: SingleFlight::new(),
            pushes: SingleFlight::new(),
            exec: Mutex::new(()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the applier.
    pub fn applier(&self) -> &A {
        &self.applier
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn handle_error(&self, error: &SyncError) {
        tracing::warn!(error = %error, retryable = error.is_retryable(), "sync failed");
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Dedupes in first-seen order; empty means the configured defaults.
    fn normalize(&self, tables: &[SyncableTable]) -> Vec<SyncableTable> {
        let source = if tables.is_empty() {
            self.config.default_tables.as_slice()
        } else {
            tables
        };
        let mut normalized = Vec::with_capacity(source.len());
        for table in source {
            if !normalized.contains(table) {
                normalized.push(*table);
            }
        }
        normalized
    }

    /// Pulls and applies changes for `tables`.
    ///
    /// Concurrent calls for the same set of tables share one pass. Passes
    /// for different sets run one after the other.
    pub fn synchronize(&self, tables: &[SyncableTable]) -> SyncOutcome {
        let tables = self.normalize(tables);
        let mut key = tables.clone();
        key.sort();

        let (outcome, shared) = self.pulls.run(key, || {
            let _exec = self.exec.lock();
            self.pull_once(&tables)
        });
        if shared {
            tracing::debug!(?tables, "joined in-flight sync");
            self.stats.write().coalesced_calls += 1;
        }
        outcome
    }

    fn pull_once(&self, tables: &[SyncableTable]) -> SyncOutcome {
        self.set_state(SyncState::Pulling);
        match self.try_pull(tables) {
            Ok((timestamp, report)) => {
                self.set_state(SyncState::Synced);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.records_applied += report.total_applied() as u64;
                    stats.records_failed += report.total_failed() as u64;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_timestamp = Some(timestamp);
                    stats.last_error = None;
                }
                tracing::info!(
                    tables = tables.len(),
                    timestamp,
                    applied = report.total_applied(),
                    failed = report.total_failed(),
                    "sync completed"
                );
                SyncOutcome::succeeded(timestamp, report)
            }
            Err(e) => {
                self.handle_error(&e);
                SyncOutcome::failed(&e)
            }
        }
    }

    fn try_pull(&self, tables: &[SyncableTable]) -> SyncResult<(i64, ApplyReport)> {
        let watermark = self.applier.watermark(tables)?;
        tracing::debug!(?tables, watermark, "pulling changes");

        let response = self
            .transport
            .pull(&PullRequest::new(watermark, tables.to_vec()))?;

        self.set_state(SyncState::Applying);
        let (batch, failures) = map_response(&response);
        let mut report = self.applier.apply(&batch)?;
        for (table, counts) in failures.tables {
            report.table_mut(table).failed += counts.failed;
        }

        self.applier.advance_cursors(tables, response.timestamp)?;
        Ok((response.timestamp, report))
    }

    /// Retries [`synchronize`](Self::synchronize) on retryable failures with
    /// the configured backoff.
    pub fn synchronize_with_retry(&self, tables: &[SyncableTable]) -> SyncOutcome {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                tracing::debug!(attempt, ?delay, "retrying sync");
                std::thread::sleep(delay);
                self.stats.write().retries += 1;
            }

            let outcome = self.synchronize(tables);
            attempt += 1;
            if outcome.success || !outcome.retryable || attempt >= max_attempts {
                return outcome;
            }
        }
    }

    /// Pushes pending rows of every pushable table.
    pub fn push_pending(&self) -> PushOutcome {
        let (outcome, shared) = self.pushes.run((), || {
            let _exec = self.exec.lock();
            self.push_once()
        });
        if shared {
            self.stats.write().coalesced_calls += 1;
        }
        outcome
    }

    fn push_once(&self) -> PushOutcome {
        self.set_state(SyncState::Pushing);
        match self.try_push() {
            Ok(outcome) => {
                self.set_state(SyncState::Synced);
                if outcome.pushed > 0 {
                    let mut stats = self.stats.write();
                    stats.pushes += 1;
                    stats.records_pushed += outcome.pushed as u64;
                    stats.last_sync_time = Some(Instant::now());
                }
                tracing::info!(
                    pushed = outcome.pushed,
                    acknowledged = outcome.acknowledged,
                    failed = outcome.failed,
                    "push completed"
                );
                outcome
            }
            Err(e) => {
                self.handle_error(&e);
                PushOutcome::failed(&e)
            }
        }
    }

    fn try_push(&self) -> SyncResult<PushOutcome> {
        let mut outcome = PushOutcome {
            success: true,
            ..PushOutcome::default()
        };
        let mut request = PushRequest::new();
        let mut sent = Vec::new();

        for d in registry::pushable() {
            let pending = self.collect_pending(d.table)?;
            outcome.failed += pending.failed;
            if pending.rows.is_empty() {
                continue;
            }
            outcome.pushed += pending.rows.len();
            request = request.with_table(pending.table, pending.changes);
            sent.push((pending.table, pending.rows));
        }

        if request.is_empty() {
            tracing::debug!("nothing to push");
            return Ok(outcome);
        }

        self.transport.push(&request)?;
        for (table, rows) in &sent {
            outcome.acknowledged += self.applier.acknowledge(*table, rows)?;
        }
        Ok(outcome)
    }

    fn collect_pending(&self, table: SyncableTable) -> SyncResult<PendingPush> {
        if !descriptor(table).pushable {
            return Err(SyncError::NotPushable(table));
        }

        let mut pending = PendingPush {
            table,
            changes: TableChanges::new(),
            rows: Vec::new(),
            failed: 0,
        };
        for row in self.applier.pending(table)? {
            match row.sync_status {
                SyncStatus::Deleted => pending.changes.deleted.push(row.server_id.clone()),
                status => match map_local(table, &row) {
                    Ok(record) if status == SyncStatus::Created => {
                        pending.changes.created.push(record)
                    }
                    Ok(record) => pending.changes.updated.push(record),
                    Err(e) => {
                        tracing::warn!(%table, id = %row.id, error = %e, "cannot push row");
                        pending.failed += 1;
                        continue;
                    }
                },
            }
            pending.rows.push((row.id, row.local_version));
        }
        Ok(pending)
    }

    /// Returns what the next push would send for `table`.
    ///
    /// Fails with [`SyncError::NotPushable`] for server-owned tables.
    pub fn pending_changes(&self, table: SyncableTable) -> SyncResult<TableChanges> {
        Ok(self.collect_pending(table)?.changes)
    }

    /// Performs a full sync cycle: pull the default tables, then push.
    ///
    /// The push is skipped if the pull fails.
    pub fn sync(&self) -> SyncCycleOutcome {
        let start = Instant::now();
        let pull = self.synchronize(&[]);
        let push = pull.success.then(|| self.push_pending());
        SyncCycleOutcome {
            pull,
            push,
            duration: start.elapsed(),
        }
    }
}

/// Maps every known table of a response. Mapping failures are returned as
/// a report so they can be merged into the apply counts.
fn map_response(response: &PullResponse) -> (ChangeBatch, ApplyReport) {
    let mut failures = ApplyReport::default();
    let mut tables = Vec::new();

    for (name, changes) in &response.changes {
        let Some(d) = registry::resolve_name(name) else {
            tracing::debug!(table = %name, "skipping unknown table");
            continue;
        };

        let mut batch = TableBatch::new(d.table);
        let mut failed = 0;
        for (records, target) in [
            (&changes.created, &mut batch.created),
            (&changes.updated, &mut batch.updated),
        ] {
            for record in records {
                match map_remote(d.table, record) {
                    Ok(local) => target.push(local),
                    Err(e) => {
                        tracing::warn!(table = %d.table, error = %e, "dropping unmappable record");
                        failed += 1;
                    }
                }
            }
        }
        batch.deleted = changes.deleted.clone();

        if failed > 0 {
            failures.table_mut(d.table).failed += failed;
        }
        tables.push(batch);
    }

    (
        ChangeBatch {
            timestamp: response.timestamp,
            tables,
        },
        failures,
    )
}
