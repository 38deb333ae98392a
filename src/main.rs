//! PulseCheck - Application Fleet Monitoring
//!
//! Probes registered applications over TCP and HTTP on a schedule, records
//! every outcome as an immutable check row, and serves a JSON management and
//! dashboard API.

mod checker;
mod config;
mod db;
mod probe;
mod scheduler;
mod web;

use config::ServerConfig;
use db::Store;
use scheduler::{RetentionSweeper, Scheduler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pulsecheck=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting PulseCheck on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Start the check scheduler (runs an immediate full pass, then ticks)
    let scheduler = Scheduler::new(store.clone(), &cfg);
    let scheduler_handle = scheduler.start();

    // Start the retention sweeper
    let sweeper = RetentionSweeper::new(store.clone(), &cfg);
    let sweeper_handle = sweeper.start();

    // Serve the API until a shutdown signal arrives
    let server = Server::new(cfg, store);
    server.start().await?;

    // Stop the background loops and drain in-flight checks
    scheduler.shutdown();
    sweeper.shutdown();
    let _ = scheduler_handle.await;
    let _ = sweeper_handle.await;
    tracing::info!("Shutdown complete");

    Ok(())
}
