//! Herald server binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite store
//! 4. Wire the content source, dry-run executor and triage services
//! 5. Serve the axum REST API until ctrl-c

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use herald_api::{routes, AppState};
use herald_core::config::HeraldConfig;
use herald_storage::{Database, ItemStore, SqliteStore};
use herald_triage::{ContentSource, DryRunExecutor, FeedFileSource, MemorySource};

use crate::cli::{expand_home, CliArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured level applies. A
    // missing file means defaults; a broken one stops startup.
    let config_file = args.resolve_config_path();
    let mut config = HeraldConfig::load_or_default(&config_file)?;
    args.apply_overrides(&mut config);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Herald v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    let db_path = data_dir.join("herald.db");
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    let store: Arc<dyn ItemStore> = Arc::new(SqliteStore::new(Arc::new(db)));

    // Content source.
    let source: Arc<dyn ContentSource> = match config.source.feed_path.as_deref() {
        Some(path) => {
            let path = expand_home(path);
            tracing::info!(path = %path.display(), "Using feed file content source");
            Arc::new(FeedFileSource::new(path))
        }
        None => {
            tracing::info!("No feed configured; only pushed items will be triaged");
            Arc::new(MemorySource::new())
        }
    };

    tracing::info!(
        block_threshold = config.triage.block_threshold,
        overfetch_factor = config.triage.overfetch_factor,
        "Triage engine configured"
    );

    let state = AppState::new(config.clone(), store, source, Arc::new(DryRunExecutor));
    routes::start_server(&config, state).await?;

    Ok(())
}
