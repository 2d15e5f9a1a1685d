// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parkway Queue - SQL-backed persistent queue for suspended workflows
//!
//! This crate stores workflow instances in PostgreSQL or SQLite, hands ready
//! instances to workers in priority order, parks instances that wait for
//! asynchronous responses, and wakes them once their responses (or a timeout)
//! arrive. Every state change is a database transaction, so several engine
//! processes can share one database.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Workflow runtime                              │
//! │   insert / dequeue / restart          finish / notify / register     │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │ (retried transaction)              │ (mpsc channel)
//!            ▼                                    ▼
//! ┌──────────────────────┐            ┌──────────────────────┐
//! │   PersistentQueue    │            │   Batcher worker     │
//! └──────────────────────┘            └──────────────────────┘
//!            │                                    │
//!            ▼                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  workflow_instance  workflow_queue  workflow_wait  workflow_response │
//! └─────────────────────────────────────────────────────────────────────┘
//!            ▲                                    ▲
//!            │                                    │
//! ┌──────────────────────┐            ┌──────────────────────┐
//! │  Wait reconciler     │            │  Stale-response      │
//! │  (WAITING → queue)   │            │  reaper              │
//! └──────────────────────┘            └──────────────────────┘
//! ```
//!
//! # Instance State Machine
//!
//! ```text
//!   insert ──► READY ──dequeue──► (owned by caller)
//!                ▲                     │
//!                │          register_callback
//!         restart│                     ▼
//!                │                  WAITING ──responses/timeout──► queued again
//!                │                     │
//!         ERROR / INVALID ◄────────────┘ set_to_error, undecodable payload
//!
//!   finish ──► row deleted (or FINISHED when history is kept)
//! ```
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PARKWAY_DATABASE_URL` | Yes | - | `postgres://...` or `sqlite:...` |
//! | `PARKWAY_MAX_CONNECTIONS` | No | `10` | Pool size |
//! | `PARKWAY_REMOVE_WHEN_FINISHED` | No | `true` | Delete finished instances |
//! | `PARKWAY_TX_MAX_ATTEMPTS` | No | `5` | Attempts per transaction |
//! | `PARKWAY_PROMOTE_BATCH_SIZE` | No | `5000` | Promotions per reconciler pass |
//! | `PARKWAY_STALE_RESPONSE_RETENTION_SECS` | No | `3600` | Orphan response retention |
//!
//! See [`config`] for the complete list.
//!
//! # Modules
//!
//! - [`queue`]: the caller-facing engine
//! - [`batcher`]: asynchronous command batching
//! - [`reconciler`]: wait-to-ready promotion
//! - [`reaper`]: stale response cleanup
//! - [`recovery`]: startup crash recovery
//! - [`retry`]: retried transactions
//! - [`dialect`]: backend-specific SQL

#![deny(missing_docs)]

/// Asynchronous command batching for fire-and-forget mutations.
pub mod batcher;

/// Workflow payload serialization.
pub mod codec;

/// Configuration loaded from environment variables.
pub mod config;

/// Connection pool setup.
pub mod db;

/// Backend-specific SQL for the hot paths.
pub mod dialect;

/// Error types and retry classification.
pub mod error;

/// Embedded schema migrations.
pub mod migrations;

/// Domain types: instances, waits, responses, states.
pub mod model;

/// The persistent queue engine.
pub mod queue;

/// Stale-response reaper.
pub mod reaper;

/// Wait-to-ready reconciliation.
pub mod reconciler;

/// Startup crash recovery.
pub mod recovery;

/// Retried transaction execution.
pub mod retry;

/// Statistics collection hooks.
pub mod stats;

/// Shared store handle.
pub mod store;

pub use codec::{CodecError, JsonCodec, WorkflowCodec};
pub use config::{Config, ConfigError, QueueConfig};
pub use dialect::{Backend, Dialect};
pub use error::{QueueError, Result};
pub use model::{ProcessingState, Response, WaitMode, WorkflowInstance};
pub use queue::{PersistentQueue, PersistentQueueBuilder};
pub use stats::{NullStatisticsCollector, StatisticsCollector, TracingStatisticsCollector};

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;
    use std::time::Duration;

    use sqlx::AnyPool;
    use sqlx::any::AnyPoolOptions;

    use crate::config::QueueConfig;
    use crate::dialect::Backend;
    use crate::model::{ProcessingState, WaitState, now_millis};
    use crate::retry::RetryPolicy;
    use crate::stats::{NullStatisticsCollector, StatisticsCollector};
    use crate::store::Store;

    /// Single-connection in-memory SQLite pool with the schema applied.
    pub(crate) async fn memory_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrations::run(&pool, Backend::Sqlite).await.unwrap();
        pool
    }

    pub(crate) fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(2),
        }
    }

    pub(crate) fn test_config() -> QueueConfig {
        QueueConfig {
            retry: fast_retry(),
            ..Default::default()
        }
    }

    pub(crate) async fn memory_store() -> Store {
        memory_store_with(Arc::new(NullStatisticsCollector)).await
    }

    pub(crate) async fn memory_store_with(statistics: Arc<dyn StatisticsCollector>) -> Store {
        Store::new(
            memory_pool().await,
            Backend::Sqlite.dialect(),
            fast_retry(),
            statistics,
        )
    }

    pub(crate) async fn seed_instance(
        pool: &AnyPool,
        id: &str,
        pool_id: &str,
        priority: i64,
        state: ProcessingState,
        payload: &[u8],
    ) {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO workflow_instance \
             (id, state, priority, pool_id, payload, last_error, created_at, last_modified_at) \
             VALUES ($1, $2, $3, $4, $5, NULL, $6, $6)",
        )
        .bind(id)
        .bind(state.as_str())
        .bind(priority)
        .bind(pool_id)
        .bind(payload.to_vec())
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    /// Wait row in `WAITING` state, inheriting the instance's pool and priority.
    pub(crate) async fn seed_wait(
        pool: &AnyPool,
        instance_id: &str,
        correlation_id: &str,
        min_responses: i64,
        timeout_at: Option<i64>,
    ) {
        sqlx::query(
            "INSERT INTO workflow_wait \
             (correlation_id, instance_id, state, pool_id, priority, min_responses, timeout_at, registered_at) \
             SELECT $1, id, $6, pool_id, priority, $2, $3, $4 FROM workflow_instance WHERE id = $5",
        )
        .bind(correlation_id)
        .bind(min_responses)
        .bind(timeout_at)
        .bind(now_millis())
        .bind(instance_id)
        .bind(WaitState::Waiting.as_str())
        .execute(pool)
        .await
        .unwrap();
    }

    pub(crate) async fn seed_response(
        pool: &AnyPool,
        correlation_id: &str,
        payload: Option<&[u8]>,
        arrived_at: i64,
    ) {
        sqlx::query(
            "INSERT INTO workflow_response (correlation_id, payload, arrived_at) VALUES ($1, $2, $3)",
        )
        .bind(correlation_id)
        .bind(payload.map(|p| p.to_vec()))
        .bind(arrived_at)
        .execute(pool)
        .await
        .unwrap();
    }

    pub(crate) async fn count(pool: &AnyPool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
        n
    }

    pub(crate) async fn queued_ids(pool: &AnyPool) -> Vec<String> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT instance_id FROM workflow_queue ORDER BY instance_id")
                .fetch_all(pool)
                .await
                .unwrap();
        rows.into_iter().map(|(id,)| id).collect()
    }

    pub(crate) async fn wait_states(pool: &AnyPool, instance_id: &str) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT state FROM workflow_wait WHERE instance_id = $1 ORDER BY correlation_id",
        )
        .bind(instance_id)
        .fetch_all(pool)
        .await
        .unwrap();
        rows.into_iter().map(|(s,)| s).collect()
    }

    pub(crate) async fn instance_state(pool: &AnyPool, instance_id: &str) -> String {
        let (state,): (String,) =
            sqlx::query_as("SELECT state FROM workflow_instance WHERE id = $1")
                .bind(instance_id)
                .fetch_one(pool)
                .await
                .unwrap();
        state
    }
}
