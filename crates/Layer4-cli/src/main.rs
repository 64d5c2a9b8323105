//! PageSync CLI - Main entry point

mod commands;
mod fs_engine;
mod pages;

use clap::{Parser, Subcommand};
use pagesync_foundation::SyncConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PageSync - page cache clear synchronization between instances
#[derive(Parser, Debug)]
#[command(name = "pagesync")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Load settings from this file instead of the global/project config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache engine root (overrides config)
    #[arg(long)]
    cache_root: Option<PathBuf>,

    /// Deployment root (overrides config)
    #[arg(long)]
    deploy_root: Option<PathBuf>,

    /// Shared sync database (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show identity, markers and log state
    Status,
    /// Run one reconciliation pass
    Sync,
    /// Reconcile periodically until Ctrl-C
    Watch {
        /// Tick interval in seconds (overrides config)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Clear the local cache and publish the clear to peers
    Clear {
        #[command(subcommand)]
        target: ClearTarget,
    },
    /// Delete log rows older than the retention window
    Prune,
}

#[derive(Subcommand, Debug)]
pub enum ClearTarget {
    /// Clear the whole cache
    All,
    /// Clear one page
    Page {
        id: u64,
        /// Also clear child pages
        #[arg(long)]
        children: bool,
        /// Extra file to delete, relative to the deployment root
        #[arg(long = "file")]
        files: Vec<String>,
        /// Extra cache directory to delete, relative to the cache root
        #[arg(long = "path")]
        paths: Vec<String>,
    },
    /// Clear according to the page's configured behaviors
    Behaviors { id: u64 },
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => SyncConfig::load_file(path)?,
        None => SyncConfig::load()?,
    };
    if let Some(cache_root) = args.cache_root {
        config.cache_root = cache_root;
    }
    if let Some(deploy_root) = args.deploy_root {
        config.deploy_root = deploy_root;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let app = commands::App::open(config)?;

    match args.command {
        Command::Status => app.status().await,
        Command::Sync => app.sync().await,
        Command::Watch { interval } => app.watch(interval).await,
        Command::Clear { target } => app.clear(target).await,
        Command::Prune => app.prune().await,
    }
}
