//! CLI command implementations.

pub mod cart;
pub mod favorite;
pub mod reset;
pub mod status;
pub mod sync;

use crate::config::CliConfig;
use crate::error::CliResult;
use clap::ValueEnum;
use partsync_engine::{DatabaseApplier, HttpTransport, ReqwestClient, SyncEngine};
use partsync_store::Database;
use serde::Serialize;
use std::sync::Arc;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// The engine the CLI drives.
pub type CliEngine = SyncEngine<HttpTransport<ReqwestClient>, DatabaseApplier>;

/// Opens the configured database.
pub fn open_database(config: &CliConfig) -> CliResult<Arc<Database>> {
    Ok(Arc::new(Database::open(&config.db_path)?))
}

/// Builds an engine over `db` talking to the configured backend.
pub fn build_engine(config: &CliConfig, db: Arc<Database>) -> CliResult<CliEngine> {
    let sync_config = config.sync_config()?;
    let client = ReqwestClient::new(sync_config.timeout, sync_config.auth_token.clone())?;
    let transport = HttpTransport::new(sync_config.server_url.clone(), client);
    Ok(SyncEngine::new(
        sync_config,
        transport,
        DatabaseApplier::new(db),
    ))
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
