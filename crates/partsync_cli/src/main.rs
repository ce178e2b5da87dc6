//! partsync CLI
//!
//! Command-line client for the storefront sync engine.
//!
//! # Commands
//!
//! - `pull` - Fetch server changes into the local store
//! - `push` - Send pending favorites upstream
//! - `sync` - Pull then push
//! - `watch` - Run a sync cycle on an interval
//! - `status` - Show cursors, row counts and pending changes
//! - `reset` - Forget pull cursors
//! - `favorite`, `cart` - Local storefront state

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use commands::Format;
use config::{parse_tables, CliConfig};
use error::CliResult;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline-first storefront sync client.
#[derive(Parser)]
#[command(name = "partsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local database file
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    /// Path to the config file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch server changes into the local store
    Pull {
        /// Comma-separated table names (defaults to the configured set)
        #[arg(short, long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Retry transient failures with backoff
        #[arg(short, long)]
        retry: bool,
    },

    /// Send pending local changes upstream
    Push,

    /// Pull, then push
    Sync,

    /// Run a sync cycle on an interval until interrupted
    Watch {
        /// Seconds between cycles (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Show cursors, row counts and pending changes
    Status,

    /// Forget pull cursors so the next pull re-fetches everything
    Reset {
        /// Tables to reset
        #[arg(short, long, value_delimiter = ',', conflicts_with = "all")]
        tables: Vec<String>,

        /// Reset every table
        #[arg(short, long)]
        all: bool,
    },

    /// Manage favorites
    #[command(subcommand)]
    Favorite(FavoriteCommand),

    /// Manage the local cart
    #[command(subcommand)]
    Cart(CartCommand),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum FavoriteCommand {
    /// Add or remove a product from favorites
    Toggle {
        /// Product server id
        product: String,

        /// User id (defaults to the configured user)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List favorites
    List {
        /// User id (defaults to the configured user)
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum CartCommand {
    /// Add a product
    Add {
        /// Product server id
        product: String,

        /// Quantity to add
        #[arg(short, long, default_value = "1")]
        qty: u32,
    },

    /// Set the quantity of a line (0 removes it)
    Set {
        /// Product server id
        product: String,

        /// New quantity
        qty: u32,
    },

    /// Remove a product
    Remove {
        /// Product server id
        product: String,
    },

    /// List the cart
    List,

    /// Empty the cart
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Commands::Version = cli.command {
        println!("partsync v{}", env!("CARGO_PKG_VERSION"));
        println!("store schema v{}", partsync_store::SCHEMA_VERSION);
        return Ok(());
    }

    let mut config = CliConfig::load(cli.config)?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let format = cli.format;
    let db = commands::open_database(&config)?;

    match cli.command {
        Commands::Pull { tables, retry } => {
            let tables = parse_tables(&tables)?;
            let engine = commands::build_engine(&config, db)?;
            commands::sync::pull(&engine, &tables, retry, format)?;
        }
        Commands::Push => {
            let engine = commands::build_engine(&config, db)?;
            commands::sync::push(&engine, format)?;
        }
        Commands::Sync => {
            let engine = commands::build_engine(&config, db)?;
            commands::sync::sync(&engine, format)?;
        }
        Commands::Watch { interval, cycles } => {
            let engine = Arc::new(commands::build_engine(&config, db)?);
            let interval = interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .or(engine.config().sync_interval)
                .unwrap_or_else(|| Duration::from_secs(config.watch_interval_secs.max(1)));
            commands::sync::watch(&engine, interval, cycles, format)?;
        }
        Commands::Status => {
            commands::status::run(&db, format)?;
        }
        Commands::Reset { tables, all } => {
            if !all && tables.is_empty() {
                return Err(error::CliError::InvalidConfig(
                    "pass --tables <names> or --all".into(),
                ));
            }
            commands::reset::run(&db, &parse_tables(&tables)?)?;
        }
        Commands::Favorite(FavoriteCommand::Toggle { product, user }) => {
            commands::favorite::toggle(&db, &config.user(user)?, &product)?;
        }
        Commands::Favorite(FavoriteCommand::List { user }) => {
            commands::favorite::list(&db, &config.user(user)?, format)?;
        }
        Commands::Cart(CartCommand::Add { product, qty }) => {
            commands::cart::add(&db, &product, qty)?;
        }
        Commands::Cart(CartCommand::Set { product, qty }) => {
            commands::cart::set(&db, &product, qty)?;
        }
        Commands::Cart(CartCommand::Remove { product }) => {
            commands::cart::remove(&db, &product)?;
        }
        Commands::Cart(CartCommand::List) => {
            commands::cart::list(&db, format)?;
        }
        Commands::Cart(CartCommand::Clear) => {
            commands::cart::clear(&db)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
