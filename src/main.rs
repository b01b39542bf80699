//! ragsync CLI entry point

use clap::{Parser, Subcommand};
use ragsync::{
    commands::{
        cmd_init, cmd_scan, cmd_status, cmd_sync, cmd_worker, print_init, print_scan_stats,
        print_status, print_sync_outcome,
    },
    config::Config,
    error::Result,
    records::EntityKind,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ragsync")]
#[command(version, about = "Durable sync worker for chatbot knowledge indexing", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize ragsync configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run the scanner and execution runner until stopped
    Worker,

    /// Run one scan tick and drive due executions
    Scan,

    /// Enqueue a sync for one entity right now
    Sync {
        /// Entity kind (document or dialogue)
        kind: String,

        /// Entity ID
        id: String,
    },

    /// Show sync status and backlog
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            let config = cmd_init(cli.config, force).await?;
            print_init(&config);
        }
        Commands::Worker => {
            let config = Config::load_or_default_path(cli.config.as_deref())?;
            cmd_worker(&config).await?;
        }
        Commands::Scan => {
            let config = Config::load_or_default_path(cli.config.as_deref())?;
            let stats = cmd_scan(&config).await?;
            print_scan_stats(&stats);
        }
        Commands::Sync { kind, id } => {
            let config = Config::load_or_default_path(cli.config.as_deref())?;
            let kind: EntityKind = kind.parse()?;
            let outcome = cmd_sync(&config, kind, &id).await?;
            print_sync_outcome(kind, &id, outcome);
        }
        Commands::Status => {
            let config = Config::load_or_default_path(cli.config.as_deref())?;
            let status = cmd_status(&config).await?;
            print_status(&status);
        }
    }

    Ok(())
}
