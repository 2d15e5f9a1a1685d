// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parkway Queue - standalone engine process
//!
//! Runs migrations, crash recovery and the background tasks (wait
//! reconciliation, stale-response cleanup, command batching) against the
//! configured database until interrupted. Workers embed the library to
//! insert and dequeue.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use parkway_queue::config::Config;
use parkway_queue::{JsonCodec, PersistentQueue, TracingStatisticsCollector, db, migrations};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parkway_queue=info")),
        )
        .init();

    info!("Starting Parkway Queue");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        max_connections = config.max_connections,
        remove_when_finished = config.queue.remove_when_finished,
        promote_batch_size = config.queue.reconciler.promote_batch_size,
        "Configuration loaded"
    );

    let (pool, backend) = db::connect(&config).await?;

    info!("Running database migrations...");
    migrations::run(&pool, backend).await?;
    info!("Migrations completed");

    let queue = PersistentQueue::builder()
        .pool(pool.clone())
        .backend(backend)
        .codec(JsonCodec::<serde_json::Value>::new())
        .config(config.queue.clone())
        .statistics(Arc::new(TracingStatisticsCollector))
        .build()?;

    queue.startup().await?;
    info!(backend = backend.as_str(), "Parkway Queue running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    queue.shutdown().await?;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
