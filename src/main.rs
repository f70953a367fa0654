//! Task Roster Server
//!
//! Serves the employee/task JSON API, or prints dashboard statistics.

use anyhow::Result;
use clap::Parser;
use task_roster::api;
use task_roster::cli::{Cli, Command};
use task_roster::config::{Config, ConfigLoader};
use task_roster::db::Database;
use task_roster::logging;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log, cli.verbose)?;

    // If explicit config path given, set it as env var for ConfigLoader to pick up
    // SAFETY: This is safe at program startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("TASK_ROSTER_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    if let Some(path) = loader.config_path() {
        debug!("Using config file {}", path.display());
    }

    // Override settings from CLI arguments
    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let config = loader.into_config();

    match cli.command {
        Some(Command::Stats { pretty }) => run_stats(&config, pretty),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Open the database, creating its directory first.
fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;
    info!("Database: {:?}", config.server.db_path);
    Ok(db)
}

/// Run the HTTP API until interrupted.
async fn run_server(config: Config) -> Result<()> {
    info!("Starting Task Roster v{}", env!("CARGO_PKG_VERSION"));

    let db = open_database(&config)?;
    let server = api::start_server(db, config.server.bind_addr()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt, stopping");
    server.shutdown().await;

    Ok(())
}

/// Print the dashboard statistics as JSON on stdout.
fn run_stats(config: &Config, pretty: bool) -> Result<()> {
    let db = open_database(config)?;
    let stats = db.dashboard_stats()?;
    let json = if pretty {
        serde_json::to_string_pretty(&stats)?
    } else {
        serde_json::to_string(&stats)?
    };
    println!("{}", json);
    Ok(())
}
