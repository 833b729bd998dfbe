//! Dolly Daemon - clone fleet orchestrator.
//!
//! Constructs one registry instance at process start, launches the scan
//! workers for active clones, and tears everything down with a bounded
//! join on shutdown. There is no hidden global: everything a caller
//! needs is handed to it from here.

use anyhow::Result;
use dolly_common::CloneStatus;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dollyd::config::DaemonConfig;
use dollyd::patterns::PatternRegistry;
use dollyd::registry::CloneRegistry;
use dollyd::scheduler::{ScanConfig, ScanScheduler};
use dollyd::snapshot::FileSnapshotSource;
use dollyd::store::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("dollyd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = DaemonConfig::load();
    let patterns = Arc::new(PatternRegistry::load_or_default(config.patterns_path()));
    let store = Arc::new(JsonFileStore::new(config.registry_path()));
    let registry = Arc::new(
        CloneRegistry::load(store, patterns, config.finding_history_cap).await,
    );

    let source = Arc::new(FileSnapshotSource::new(config.facts_path()));
    let scheduler = Arc::new(ScanScheduler::new(source, ScanConfig::from(&config)));

    let mut scanning = 0usize;
    for record in registry.list().await {
        if record.status == CloneStatus::Active {
            if let Some(handle) = registry.handle(&record.id).await {
                scheduler.start_scan(handle).await;
                scanning += 1;
            }
        }
    }

    info!(
        "dollyd ready ({} clones, {} scan workers)",
        registry.list().await.len(),
        scanning
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");

    scheduler.stop_all().await;
    registry.persist().await;

    info!("Shutdown complete");
    Ok(())
}
