//! internet-learning server
//!
//! Usage: `internet-learning [config.toml]`. Without an argument the path in
//! `LEARNING_CONFIG` is used if set, otherwise only defaults and
//! `LEARNING__*` environment variables apply.

use anyhow::{Context, Result};
use internet_learning::api::{build_router, AppState};
use internet_learning::logging::init_tracing;
use internet_learning::{Config, LearningCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LEARNING_CONFIG").ok())
        .map(PathBuf::from);

    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        "Starting internet-learning"
    );

    let coordinator = Arc::new(
        LearningCoordinator::from_config(&config).context("Failed to build learning coordinator")?,
    );

    // Stale facts are dropped in the background
    let pruner = coordinator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let report = pruner.prune_stale().await;
            if report.removed > 0 {
                info!(removed = report.removed, "Removed stale facts");
            }
            if !report.persisted {
                warn!("Stale facts were removed in memory only, snapshot write failed");
            }
        }
    });

    let app = build_router(AppState { coordinator }, config.server.max_body_bytes);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
