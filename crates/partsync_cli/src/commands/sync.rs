//! `pull`, `push`, `sync` and `watch` commands.

use super::{print_json, Format};
use crate::error::{CliError, CliResult};
use partsync_engine::{
    ApplyReport, PushOutcome, SyncApplier, SyncCycleOutcome, SyncEngine, SyncOutcome,
    SyncTransport,
};
use partsync_protocol::SyncableTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Per-table counts of a pull.
#[derive(Debug, Serialize)]
pub struct TableCounts {
    /// Rows inserted.
    pub created: usize,
    /// Rows overwritten.
    pub updated: usize,
    /// Rows tombstoned.
    pub deleted: usize,
    /// Changes skipped.
    pub skipped: usize,
    /// Updates for unknown rows.
    pub missing: usize,
    /// Records that failed.
    pub failed: usize,
}

/// Printable pull result.
#[derive(Debug, Serialize)]
pub struct PullReport {
    /// Whether the pull completed.
    pub success: bool,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server timestamp stored as cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Counts per table.
    pub tables: BTreeMap<String, TableCounts>,
}

fn table_counts(report: &ApplyReport) -> BTreeMap<String, TableCounts> {
    report
        .tables
        .iter()
        .map(|(table, r)| {
            let counts = TableCounts {
                created: r.created,
                updated: r.updated,
                deleted: r.deleted,
                skipped: r.skipped,
                missing: r.missing,
                failed: r.failed,
            };
            (table.to_string(), counts)
        })
        .collect()
}

impl From<&SyncOutcome> for PullReport {
    fn from(outcome: &SyncOutcome) -> Self {
        Self {
            success: outcome.success,
            error: outcome.error.clone(),
            timestamp: outcome.timestamp,
            tables: table_counts(&outcome.report),
        }
    }
}

/// Printable push result.
#[derive(Debug, Serialize)]
pub struct PushReport {
    /// Whether the push completed.
    pub success: bool,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rows sent.
    pub pushed: usize,
    /// Rows marked synced.
    pub acknowledged: usize,
    /// Rows that could not be sent.
    pub failed: usize,
}

impl From<&PushOutcome> for PushReport {
    fn from(outcome: &PushOutcome) -> Self {
        Self {
            success: outcome.success,
            error: outcome.error.clone(),
            pushed: outcome.pushed,
            acknowledged: outcome.acknowledged,
            failed: outcome.failed,
        }
    }
}

/// Printable cycle result.
#[derive(Debug, Serialize)]
pub struct CycleReport {
    /// Pull pass.
    pub pull: PullReport,
    /// Push pass, absent when the pull failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushReport>,
    /// Wall time in milliseconds.
    pub duration_ms: u128,
}

impl From<&SyncCycleOutcome> for CycleReport {
    fn from(cycle: &SyncCycleOutcome) -> Self {
        Self {
            pull: PullReport::from(&cycle.pull),
            push: cycle.push.as_ref().map(PushReport::from),
            duration_ms: cycle.duration.as_millis(),
        }
    }
}

fn print_pull(report: &PullReport) {
    match (&report.error, report.timestamp) {
        (Some(error), _) => println!("pull failed: {error}"),
        (None, Some(ts)) => println!("pull ok, cursor {ts}"),
        (None, None) => println!("pull ok"),
    }
    for (table, c) in &report.tables {
        println!(
            "  {table}: {} created, {} updated, {} deleted, {} skipped, {} missing, {} failed",
            c.created, c.updated, c.deleted, c.skipped, c.missing, c.failed
        );
    }
}

fn print_push(report: &PushReport) {
    match &report.error {
        Some(error) => println!("push failed: {error}"),
        None => println!(
            "push ok: {} sent, {} acknowledged, {} failed",
            report.pushed, report.acknowledged, report.failed
        ),
    }
}

fn print_cycle(report: &CycleReport, format: Format) -> CliResult<()> {
    match format {
        Format::Json => print_json(report),
        Format::Text => {
            print_pull(&report.pull);
            if let Some(push) = &report.push {
                print_push(push);
            }
            Ok(())
        }
    }
}

/// Pulls `tables` (the configured defaults when empty).
pub fn pull<T: SyncTransport, A: SyncApplier>(
    engine: &SyncEngine<T, A>,
    tables: &[SyncableTable],
    retry: bool,
    format: Format,
) -> CliResult<PullReport> {
    let outcome = if retry {
        engine.synchronize_with_retry(tables)
    } else {
        engine.synchronize(tables)
    };

    let report = PullReport::from(&outcome);
    match format {
        Format::Json => print_json(&report)?,
        Format::Text => print_pull(&report),
    }
    match outcome.error {
        Some(error) => Err(CliError::SyncFailed(error)),
        None => Ok(report),
    }
}

/// Pushes pending local changes.
pub fn push<T: SyncTransport, A: SyncApplier>(
    engine: &SyncEngine<T, A>,
    format: Format,
) -> CliResult<PushReport> {
    let outcome = engine.push_pending();
    let report = PushReport::from(&outcome);
    match format {
        Format::Json => print_json(&report)?,
        Format::Text => print_push(&report),
    }
    match outcome.error {
        Some(error) => Err(CliError::SyncFailed(error)),
        None => Ok(report),
    }
}

/// Runs one full cycle.
pub fn sync<T: SyncTransport, A: SyncApplier>(
    engine: &SyncEngine<T, A>,
    format: Format,
) -> CliResult<CycleReport> {
    let cycle = engine.sync();
    let report = CycleReport::from(&cycle);
    print_cycle(&report, format)?;
    if cycle.success() {
        Ok(report)
    } else {
        let error = cycle
            .push
            .and_then(|p| p.error)
            .or(cycle.pull.error)
            .unwrap_or_else(|| "unknown error".to_string());
        Err(CliError::SyncFailed(error))
    }
}

/// Runs a cycle every `interval` until interrupted or `cycles` are done.
///
/// Cycle failures are reported and the loop keeps going.
pub fn watch<T, A>(
    engine: &Arc<SyncEngine<T, A>>,
    interval: Duration,
    cycles: Option<u64>,
    format: Format,
) -> CliResult<u64>
where
    T: SyncTransport + 'static,
    A: SyncApplier + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    tracing::info!(interval_secs = interval.as_secs(), "watching");
    runtime.block_on(async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(completed, "interrupted");
                    break;
                }
            }

            // The engine blocks on I/O; keep it off the async workers.
            let worker = Arc::clone(engine);
            let cycle = tokio::task::spawn_blocking(move || worker.sync())
                .await
                .map_err(|e| CliError::SyncFailed(format!("sync task failed: {e}")))?;

            if !cycle.success() {
                tracing::warn!("cycle failed, retrying at next tick");
            }
            print_cycle(&CycleReport::from(&cycle), format)?;

            completed += 1;
            if cycles.is_some_and(|n| completed >= n) {
                break;
            }
        }
        Ok::<u64, CliError>(completed)
    })
}
