//! # partsync Sync Engine
//!
//! Pull/push replication between the storefront backend and the local store.
//!
//! This crate provides:
//! - Sync engine with state tracking (idle → pulling → applying → synced)
//! - Table registry and explicit per-table field mapping
//! - Per-table cursors with a minimum watermark per pull
//! - Single-flight coalescing of concurrent sync calls
//! - Retry with exponential backoff
//! - HTTP transport abstraction (`reqwest` and in-process loopback)
//! - Database-backed sync applier
//!
//! ## Architecture
//!
//! A pull pass runs in four steps:
//! 1. Read the cursors of the requested tables and pull from their minimum
//! 2. Map every known table's records to local rows
//! 3. Apply the whole changeset in one local transaction
//! 4. Store the server timestamp as the cursor of every requested table
//!
//! A push pass sends pending favorites and marks them synced on success.
//!
//! ## Key Invariants
//!
//! - The backend is authoritative for catalog tables
//! - A failed pull leaves rows and cursors untouched
//! - Applying the same changeset twice is a no-op
//! - One bad record never fails the whole pass

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod engine;
mod error;
mod flight;
mod http;
mod mapper;
mod registry;
mod transport;

pub use applier::{ApplyReport, ChangeBatch, DatabaseApplier, SyncApplier, TableBatch, TableReport};
pub use config::{RetryConfig, SyncConfig};
pub use engine::{PushOutcome, SyncCycleOutcome, SyncEngine, SyncOutcome, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use flight::SingleFlight;
pub use http::{
    HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, ReqwestClient,
};
pub use mapper::{map_local, map_remote, parse_timestamp, timestamp_value, MapError};
pub use registry::{descriptor, pushable, resolve_name, FieldKind, FieldSpec, TableDescriptor};
pub use transport::{MockTransport, SyncTransport};
