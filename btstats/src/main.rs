//! btstats - analytics service for the berrytube event log
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/btstats/btstats.log (~/.local/state/btstats/btstats.log)
//! - Config: $XDG_CONFIG_HOME/btstats/config.toml (~/.config/btstats/config.toml)
//!
//! The store location is read from the secret file named by `store.url_file`.

use anyhow::{Context, Result};
use btstats::{api, import};
use btstats_core::{Action, ActionRegistry, Config, Database, QueryService, StoreSettings};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "btstats")]
#[command(about = "Ranked, time-windowed analytics over a chat and video event log")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/btstats/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Listen address (default: from config)
        #[arg(long)]
        bind: Option<String>,

        /// Listen port (default: from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one action and print its result
    Query {
        /// Action name, e.g. `drinks`
        action: String,
    },

    /// Append JSON-lines events to the store
    Import {
        /// File with one `{"stream", "time", "payload"}` object per line
        file: PathBuf,
    },

    /// List registered actions
    Actions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        btstats_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Serve { bind, port } => cmd_serve(&config, bind, port).await,
        Command::Query { action } => cmd_query(&config, &action).await,
        Command::Import { file } => cmd_import(&config, &file),
        Command::Actions => cmd_actions(),
    }
}

/// Resolve the store from its secret file. There is no fallback.
fn store_settings(config: &Config) -> Result<StoreSettings> {
    let settings = StoreSettings::from_secret_file(&config.store.url_file)
        .context("store url file is required")?;
    tracing::info!(path = %settings.database_path.display(), "Using event store");
    Ok(settings)
}

async fn cmd_serve(config: &Config, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let store = store_settings(config)?;
    let service = QueryService::from_config(config, store).context("failed to build service")?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {bind}:{port}"))?;

    tracing::info!("btstats starting");
    api::serve(addr, Arc::new(service)).await
}

async fn cmd_query(config: &Config, action: &str) -> Result<()> {
    let store = store_settings(config)?;
    let service = QueryService::from_config(config, store).context("failed to build service")?;

    let reply = service
        .handle(action)
        .await
        .with_context(|| format!("action {action} failed"))?;
    println!("{}", reply.body());
    Ok(())
}

fn cmd_import(config: &Config, file: &std::path::Path) -> Result<()> {
    let store = store_settings(config)?;

    let db = Database::open(&store.database_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let count = import::import_file(&db, file)?;
    println!("Imported {} event(s) from {}", count, file.display());
    println!("Events in store: {}", db.count_events(None)?);
    Ok(())
}

fn cmd_actions() -> Result<()> {
    for action in ActionRegistry::builtin().iter() {
        match action {
            Action::Standard(descriptor) => {
                println!("{:<12} {}", descriptor.name, descriptor.stream)
            }
            Action::Custom(custom) => println!("{:<12} (remote)", custom.name()),
        }
    }
    Ok(())
}
