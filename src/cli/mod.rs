//! CLI command definitions for task-roster.
//!
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::logging::LogTarget;
use clap::{Parser, Subcommand};
use std::net::IpAddr;

/// Employee task tracking server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Address to listen on (overrides config)
    #[arg(long, global = true)]
    pub host: Option<IpAddr>,

    /// Port to listen on (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: LogTarget,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API server (default if no subcommand given)
    Serve,

    /// Print dashboard statistics as JSON
    Stats {
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}
