// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that deletes stale responses.
//!
//! A response is stale once it is older than the retention horizon and no
//! wait references its correlation id. Each cycle deletes in capped batches,
//! one transaction per batch, until a batch comes back smaller than the cap.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::AnyConnection;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{ConfigError, env_positive, env_secs};
use crate::error::Result;
use crate::model::now_millis;
use crate::retry::Transactional;
use crate::stats::points;
use crate::store::Store;

/// Configuration for the stale-response reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Responses younger than this are never deleted.
    pub retention: Duration,
    /// Maximum rows deleted per transaction.
    pub batch_size: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),  // 1 hour
            retention: Duration::from_secs(3600), // 1 hour
            batch_size: 20_000,
        }
    }
}

impl ReaperConfig {
    /// Load configuration from environment variables.
    ///
    /// - `PARKWAY_STALE_RESPONSE_INTERVAL_SECS`: seconds between cycles (default: 3600)
    /// - `PARKWAY_STALE_RESPONSE_RETENTION_SECS`: retention horizon (default: 3600)
    /// - `PARKWAY_STALE_RESPONSE_BATCH_SIZE`: rows per transaction (default: 20000)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            interval: env_secs("PARKWAY_STALE_RESPONSE_INTERVAL_SECS", defaults.interval)?,
            retention: env_secs("PARKWAY_STALE_RESPONSE_RETENTION_SECS", defaults.retention)?,
            batch_size: env_positive("PARKWAY_STALE_RESPONSE_BATCH_SIZE", defaults.batch_size)?,
        })
    }
}

struct DeleteStaleBatch<'a> {
    query: &'a str,
    cutoff: i64,
    limit: i64,
}

#[async_trait]
impl Transactional for DeleteStaleBatch<'_> {
    type Output = u64;

    fn operation(&self) -> &'static str {
        "delete_stale_responses"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<u64> {
        let deleted = sqlx::query(self.query)
            .bind(self.cutoff)
            .bind(self.limit)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

/// Run one reaper cycle: delete stale responses batch by batch until the
/// backlog is drained.
///
/// Returns the total number of rows deleted.
pub async fn delete_stale_responses(store: &Store, config: &ReaperConfig) -> Result<u64> {
    let cutoff = now_millis().saturating_sub(config.retention.as_millis() as i64);
    let work = DeleteStaleBatch {
        query: store.dialect().delete_stale_responses_query(),
        cutoff,
        limit: config.batch_size as i64,
    };

    let mut total_deleted = 0u64;
    loop {
        let started = Instant::now();
        let deleted = store.run(&work).await?;
        store.record(points::DELETE_STALE_RESPONSES, deleted as usize, started.elapsed());
        total_deleted += deleted;

        debug!(deleted, total_deleted, "Deleted batch of stale responses");

        // A short batch means the backlog is drained
        if deleted < config.batch_size as u64 {
            break;
        }
    }

    if total_deleted > 0 {
        info!(total_deleted, cutoff, "Stale response cleanup completed");
    } else {
        debug!("Stale response cleanup completed, nothing to delete");
    }

    Ok(total_deleted)
}

/// Fixed-delay background worker around [`delete_stale_responses`].
pub struct Reaper {
    store: Store,
    config: ReaperConfig,
    shutdown: watch::Receiver<bool>,
}

impl Reaper {
    /// Create a reaper that stops once `shutdown` turns `true`.
    pub fn new(store: Store, config: ReaperConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            store,
            config,
            shutdown,
        }
    }

    /// Run the reaper loop.
    ///
    /// The first cycle runs one `interval` after start; the engine already
    /// sweeps once during startup. A cycle in progress is never interrupted.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention.as_secs(),
            batch_size = self.config.batch_size,
            "Stale response reaper started"
        );

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Stale response reaper received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = delete_stale_responses(&self.store, &self.config).await {
                        error!(error = %e, "Failed to delete stale responses");
                    }
                }
            }
        }

        info!("Stale response reaper stopped");
    }
}
