//! AIS streamer utility

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ais_streamer::{
    config::AppConfig, errors::AisStreamerError, health, snapshot, storage::PgStorage,
    supervisor::IngestSupervisor,
};

#[derive(Debug, Parser)]
#[command(version, about = "Capture positions of tracked vessels from aisstream.io")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the health endpoint and the feed ingest (default)
    Run,
    /// Merge the latest stored positions into a JSON snapshot, then clear the store
    UpdateLatest {
        #[arg(long, default_value = "data/ais_latest.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), AisStreamerError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration, preferring environment variables and config files
    let config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_streamer(config).await,
        Command::UpdateLatest { file } => run_update_latest(config, &file).await,
    }
}

async fn run_streamer(config: AppConfig) -> Result<(), AisStreamerError> {
    config.validate()?;

    // rustls needs an explicit provider when more than one is compiled in
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let storage = PgStorage::connect_lazy(&config.database)?;
    if config.database.run_migrations {
        // Not fatal: the health endpoint stays up and inserts fail per message
        if let Err(e) = storage.migrate().await {
            error!("Database migration failed: {}", e);
        }
    }

    let supervisor = IngestSupervisor::new(config.feed.clone(), Arc::new(storage))?;

    let bind = config.health.bind;
    tokio::spawn(async move {
        if let Err(e) = health::serve(bind).await {
            error!("Health endpoint stopped: {}", e);
        }
    });

    tokio::select! {
        _ = supervisor.run() => {}
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn run_update_latest(config: AppConfig, file: &Path) -> Result<(), AisStreamerError> {
    config.database.validate()?;

    let storage = PgStorage::connect_lazy(&config.database)?;
    let summary = snapshot::update_latest(&storage, file).await?;
    info!(
        vessels = summary.vessels,
        updated = summary.updated,
        purged = summary.purged,
        "Snapshot update complete"
    );
    Ok(())
}
