// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wait-to-ready promotion.
//!
//! A waiting instance becomes promotable when enough responses have arrived
//! for its waits (all of them, or the first one, depending on its
//! [`WaitMode`](crate::model::WaitMode)) or when its timeout has passed.
//! Promotion marks its waits `SATISFIED` and inserts a queue entry, in one
//! transaction.
//!
//! The background loop paces itself on the size of the last pass:
//! - full batch: poll again immediately
//! - partial batch: pause briefly
//! - nothing promoted: pause longer

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{AnyConnection, Row};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{ConfigError, env_millis, env_positive};
use crate::error::Result;
use crate::model::{WaitState, now_millis};
use crate::retry::Transactional;
use crate::stats::points;
use crate::store::Store;

/// Reconciliation loop pacing.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Maximum instances promoted per pass.
    pub promote_batch_size: usize,
    /// Pause after a pass that promoted fewer than the batch size.
    pub partial_pause: Duration,
    /// Pause after a pass that promoted nothing.
    pub idle_pause: Duration,
    /// Batch size used while draining the backlog during crash recovery.
    pub recovery_batch_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            promote_batch_size: 5000,
            partial_pause: Duration::from_secs(1),
            idle_pause: Duration::from_secs(2),
            recovery_batch_size: 100_000,
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `PARKWAY_PROMOTE_BATCH_SIZE`: instances per pass (default: 5000)
    /// - `PARKWAY_PROMOTE_PARTIAL_PAUSE_MS`: pause after a partial pass (default: 1000)
    /// - `PARKWAY_PROMOTE_IDLE_PAUSE_MS`: pause after an empty pass (default: 2000)
    /// - `PARKWAY_RECOVERY_PROMOTE_BATCH_SIZE`: batch size during recovery (default: 100000)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            promote_batch_size: env_positive("PARKWAY_PROMOTE_BATCH_SIZE", defaults.promote_batch_size)?,
            partial_pause: env_millis("PARKWAY_PROMOTE_PARTIAL_PAUSE_MS", defaults.partial_pause)?,
            idle_pause: env_millis("PARKWAY_PROMOTE_IDLE_PAUSE_MS", defaults.idle_pause)?,
            recovery_batch_size: env_positive(
                "PARKWAY_RECOVERY_PROMOTE_BATCH_SIZE",
                defaults.recovery_batch_size,
            )?,
        })
    }

    /// How long to wait after a pass that promoted `promoted` instances.
    pub fn pause_after(&self, promoted: usize) -> Option<Duration> {
        if promoted >= self.promote_batch_size {
            None
        } else if promoted == 0 {
            Some(self.idle_pause)
        } else {
            Some(self.partial_pause)
        }
    }
}

struct PromoteReady<'a> {
    query: &'a str,
    max: i64,
}

#[async_trait]
impl Transactional for PromoteReady<'_> {
    type Output = usize;

    fn operation(&self) -> &'static str {
        "promote_ready"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<usize> {
        let now = now_millis();
        let candidates = sqlx::query(self.query)
            .bind(now)
            .bind(self.max)
            .fetch_all(&mut *conn)
            .await?;

        let mut promoted = 0;
        for row in candidates {
            let instance_id: String = row.try_get("instance_id")?;
            let pool_id: String = row.try_get("pool_id")?;
            let priority: i64 = row.try_get("priority")?;

            // Another process may have promoted it since the scan.
            let satisfied = sqlx::query(
                "UPDATE workflow_wait SET state = $2 WHERE instance_id = $1 AND state = $3",
            )
            .bind(&instance_id)
            .bind(WaitState::Satisfied.as_str())
            .bind(WaitState::Waiting.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
            if satisfied == 0 {
                continue;
            }

            sqlx::query(
                "INSERT INTO workflow_queue (instance_id, pool_id, priority, last_modified_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (instance_id) DO NOTHING",
            )
            .bind(&instance_id)
            .bind(&pool_id)
            .bind(priority)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            promoted += 1;
        }

        Ok(promoted)
    }
}

/// Promote up to `max` satisfied instances in one transaction.
///
/// Returns the number of instances that received a queue entry.
pub async fn promote_ready(store: &Store, max: usize) -> Result<usize> {
    let started = Instant::now();
    let promoted = store
        .run(&PromoteReady {
            query: store.dialect().promotable_query(),
            max: max as i64,
        })
        .await?;
    store.record(points::PROMOTE, promoted, started.elapsed());
    Ok(promoted)
}

/// Background task that runs [`promote_ready`] until shutdown.
pub struct Reconciler {
    store: Store,
    config: ReconcilerConfig,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    /// Create a reconciler that stops once `shutdown` turns `true`.
    pub fn new(store: Store, config: ReconcilerConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            store,
            config,
            shutdown,
        }
    }

    /// Run the reconciliation loop.
    ///
    /// Shutdown is checked once per pass; an in-flight pass always finishes.
    pub async fn run(mut self) {
        info!(
            batch_size = self.config.promote_batch_size,
            partial_pause_ms = self.config.partial_pause.as_millis() as u64,
            idle_pause_ms = self.config.idle_pause.as_millis() as u64,
            "Wait reconciler started"
        );

        while !*self.shutdown.borrow() {
            let pause = match promote_ready(&self.store, self.config.promote_batch_size).await {
                Ok(promoted) => {
                    if promoted > 0 {
                        debug!(promoted, "Promoted waiting instances");
                    }
                    self.config.pause_after(promoted)
                }
                Err(e) => {
                    error!(error = %e, "Wait reconciliation pass failed");
                    Some(self.config.idle_pause)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    biased;

                    changed = self.shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }

                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!("Wait reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{ENV_MUTEX, EnvGuard};
    use crate::model::ProcessingState;
    use crate::test_util::*;

    #[test]
    fn test_config_default() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.promote_batch_size, 5000);
        assert_eq!(config.partial_pause, Duration::from_secs(1));
        assert_eq!(config.idle_pause, Duration::from_secs(2));
        assert_eq!(config.recovery_batch_size, 100_000);
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PARKWAY_PROMOTE_BATCH_SIZE", "10");
        guard.set("PARKWAY_PROMOTE_PARTIAL_PAUSE_MS", "5");
        guard.remove("PARKWAY_PROMOTE_IDLE_PAUSE_MS");
        guard.remove("PARKWAY_RECOVERY_PROMOTE_BATCH_SIZE");

        let config = ReconcilerConfig::from_env().unwrap();
        assert_eq!(config.promote_batch_size, 10);
        assert_eq!(config.partial_pause, Duration::from_millis(5));
        assert_eq!(config.idle_pause, Duration::from_secs(2));
        assert_eq!(config.recovery_batch_size, 100_000);
    }

    #[test]
    fn test_adaptive_pacing() {
        let config = ReconcilerConfig {
            promote_batch_size: 10,
            ..Default::default()
        };
        assert_eq!(config.pause_after(10), None);
        assert_eq!(config.pause_after(3), Some(Duration::from_secs(1)));
        assert_eq!(config.pause_after(0), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_promotes_when_all_responses_arrived() {
        let store = memory_store().await;
        let pool = store.pool();
        seed_instance(pool, "i1", "pool-a", 4, ProcessingState::Waiting, b"{}").await;
        seed_wait(pool, "i1", "c1", 2, None).await;
        seed_wait(pool, "i1", "c2", 2, None).await;
        seed_response(pool, "c1", Some(b"one"), now_millis()).await;

        assert_eq!(promote_ready(&store, 100).await.unwrap(), 0);
        assert!(queued_ids(pool).await.is_empty());

        seed_response(pool, "c2", None, now_millis()).await;
        assert_eq!(promote_ready(&store, 100).await.unwrap(), 1);
        assert_eq!(queued_ids(pool).await, vec!["i1"]);
        assert_eq!(wait_states(pool, "i1").await, vec!["SATISFIED", "SATISFIED"]);
        assert_eq!(instance_state(pool, "i1").await, "WAITING");

        // Satisfied waits are not promoted twice.
        assert_eq!(promote_ready(&store, 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_mode_promotes_on_one_response() {
        let store = memory_store().await;
        let pool = store.pool();
        seed_instance(pool, "i1", "pool-a", 1, ProcessingState::Waiting, b"{}").await;
        seed_wait(pool, "i1", "c1", 1, None).await;
        seed_wait(pool, "i1", "c2", 1, None).await;
        seed_response(pool, "c2", Some(b"two"), now_millis()).await;

        assert_eq!(promote_ready(&store, 100).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promotes_on_timeout_without_response() {
        let store = memory_store().await;
        let pool = store.pool();
        seed_instance(pool, "late", "pool-a", 1, ProcessingState::Waiting, b"{}").await;
        seed_wait(pool, "late", "c1", 1, Some(now_millis() - 1_000)).await;
        seed_instance(pool, "early", "pool-a", 1, ProcessingState::Waiting, b"{}").await;
        seed_wait(pool, "early", "c2", 1, Some(now_millis() + 600_000)).await;

        assert_eq!(promote_ready(&store, 100).await.unwrap(), 1);
        assert_eq!(queued_ids(pool).await, vec!["late"]);
    }

    #[tokio::test]
    async fn test_failed_instances_are_not_promoted() {
        let store = memory_store().await;
        let pool = store.pool();
        seed_instance(pool, "failed", "pool-a", 1, ProcessingState::Error, b"{}").await;
        seed_wait(pool, "failed", "c1", 1, None).await;
        seed_response(pool, "c1", None, now_millis()).await;

        assert_eq!(promote_ready(&store, 100).await.unwrap(), 0);
        assert_eq!(wait_states(pool, "failed").await, vec!["WAITING"]);
    }

    #[tokio::test]
    async fn test_batch_cap_is_respected() {
        let store = memory_store().await;
        let pool = store.pool();
        for i in 0..5 {
            let id = format!("i{i}");
            let cid = format!("c{i}");
            seed_instance(pool, &id, "pool-a", 1, ProcessingState::Waiting, b"{}").await;
            seed_wait(pool, &id, &cid, 1, None).await;
            seed_response(pool, &cid, None, now_millis()).await;
        }

        assert_eq!(promote_ready(&store, 2).await.unwrap(), 2);
        assert_eq!(promote_ready(&store, 2).await.unwrap(), 2);
        assert_eq!(promote_ready(&store, 2).await.unwrap(), 1);
        assert_eq!(promote_ready(&store, 2).await.unwrap(), 0);
        assert_eq!(queued_ids(pool).await.len(), 5);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let store = memory_store().await;
        let (tx, rx) = watch::channel(false);
        let config = ReconcilerConfig {
            idle_pause: Duration::from_secs(60),
            ..Default::default()
        };
        let handle = tokio::spawn(Reconciler::new(store, config, rx).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reconciler did not stop")
            .unwrap();
    }
}
