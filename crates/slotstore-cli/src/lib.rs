//! Slotstore CLI - create, check, repair and inspect database directories

pub mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slotstore_core::StoreConfig;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Administration tool for slotstore database directories
#[derive(Parser, Debug)]
#[command(name = "slotstore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML store configuration
    #[arg(long, env = "SLOTSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty database directory
    Create {
        /// Database directory
        dir: PathBuf,
    },
    /// Report stores that were not shut down cleanly
    Check {
        /// Database directory
        dir: PathBuf,
        /// Rebuild the id files of stores that are not ok
        #[arg(long)]
        repair: bool,
    },
    /// Print per-store statistics
    Stats {
        /// Database directory
        dir: PathBuf,
    },
    /// List relationship type names
    Types {
        /// Database directory
        dir: PathBuf,
    },
    /// Print the effective store configuration
    Config,
}

/// Load the store configuration named on the command line, or the defaults
pub fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(StoreConfig::default()),
    }
}

/// Execute one parsed command line, writing its report to `out`
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Create { dir } => commands::store::create(&dir, &config, out),
        Commands::Check { dir, repair } => commands::store::check(&dir, &config, repair, out),
        Commands::Stats { dir } => commands::inspect::stats(&dir, &config, out),
        Commands::Types { dir } => commands::inspect::types(&dir, &config, out),
        Commands::Config => commands::inspect::config(&config, out),
    }
}
