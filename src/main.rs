use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use perfume_import_lib::application::{ImportError, ImportOrchestrator};
use perfume_import_lib::infrastructure::{
    AppConfig, AssetStorage, ConfigManager, DatabaseConnection, HttpClient, SharedRng,
    SqliteCatalogRepository, TokioSleeper, init_logging_with_config,
};

#[derive(Parser)]
#[command(name = "perfume-import")]
#[command(about = "Import perfumes from a ';'-separated file and enrich them with images and descriptions")]
#[command(version)]
struct Cli {
    /// Input file (header row with Perfume, Brand, url, ...)
    csv_file: PathBuf,

    /// Configuration file (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog database URL, e.g. sqlite://data/catalog.db
    #[arg(long)]
    database_url: Option<String>,

    /// Media root directory for downloaded images
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON formatted logs
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(dir) = &self.media_dir {
            config.media.root = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json_format = true;
        }
    }
}

async fn load_config(cli: &Cli) -> Result<AppConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn build_orchestrator(config: &AppConfig) -> Result<ImportOrchestrator> {
    let db = DatabaseConnection::new(&config.database.url).await?;
    db.migrate().await.context("Failed to prepare catalog schema")?;

    let rng = Arc::new(SharedRng::new(config.rng_seed));
    let fetcher = Arc::new(HttpClient::new(config.fetch.clone(), rng.clone())?);
    let repository = Arc::new(SqliteCatalogRepository::new(
        db.pool().clone(),
        AssetStorage::from_config(&config.media),
    ));

    Ok(ImportOrchestrator::from_config(
        config,
        repository,
        fetcher,
        Arc::new(TokioSleeper),
        rng,
    ))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging_with_config(&config.logging) {
        eprintln!("❌ Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let orchestrator = match build_orchestrator(&config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("❌ Startup failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match orchestrator.run_file(&cli.csv_file).await {
        Ok(summary) => {
            info!("Done: {} rows read, {} failed", summary.rows_read, summary.failed);
            ExitCode::SUCCESS
        }
        Err(ImportError::RateLimitExhausted { row, name, url, attempts }) => {
            error!("⛔ Rate limited on all {} attempts for {} ({})", attempts, name, url);
            error!(
                "Stopped due to persistent rate limiting. Last uncompleted row: {}. Wait ~30 minutes and run again to resume.",
                row
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
