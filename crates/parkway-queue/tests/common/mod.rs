// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for parkway-queue integration tests.
//!
//! Queues run against a file-backed SQLite database in a temporary
//! directory, so several pooled connections see the same data.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use sqlx::AnyPool;
use tempfile::TempDir;

use parkway_queue::config::{Config, QueueConfig};
use parkway_queue::retry::RetryPolicy;
use parkway_queue::{JsonCodec, PersistentQueue, StatisticsCollector, db, migrations};

pub type JsonQueue = PersistentQueue<JsonCodec<Value>>;

/// A queue plus the resources it lives on.
pub struct TestQueue {
    pub queue: JsonQueue,
    pub pool: AnyPool,
    _dir: Option<TempDir>,
}

/// Settings tuned for tests: patient retries and a fast reconciler.
pub fn test_config() -> QueueConfig {
    let mut config = QueueConfig::default();
    config.retry = RetryPolicy {
        max_attempts: 50,
        base_delay: Duration::from_millis(5),
    };
    config.reconciler.idle_pause = Duration::from_millis(50);
    config.reconciler.partial_pause = Duration::from_millis(20);
    config
}

/// Build (but do not start) a queue on a fresh SQLite file.
pub async fn sqlite_queue(
    config: QueueConfig,
    statistics: Option<Arc<dyn StatisticsCollector>>,
) -> TestQueue {
    let dir = tempfile::tempdir().unwrap();
    let database_url = db::sqlite_file_url(dir.path().join("queue.db"));
    let mut queue = build_queue(&database_url, config, statistics).await;
    queue._dir = Some(dir);
    queue
}

/// Build (but do not start) a queue on `TEST_DATABASE_URL`.
pub async fn postgres_queue(config: QueueConfig) -> Option<TestQueue> {
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
    Some(build_queue(&database_url, config, None).await)
}

async fn build_queue(
    database_url: &str,
    config: QueueConfig,
    statistics: Option<Arc<dyn StatisticsCollector>>,
) -> TestQueue {
    let settings = Config {
        database_url: database_url.to_string(),
        max_connections: 4,
        queue: config.clone(),
    };
    let (pool, backend) = db::connect(&settings).await.unwrap();
    migrations::run(&pool, backend).await.unwrap();

    let mut builder = PersistentQueue::builder()
        .pool(pool.clone())
        .backend(backend)
        .codec(JsonCodec::new())
        .config(config);
    if let Some(statistics) = statistics {
        builder = builder.statistics(statistics);
    }

    TestQueue {
        queue: builder.build().unwrap(),
        pool,
        _dir: None,
    }
}

/// Records the element count of every sample.
#[derive(Default)]
pub struct CountingCollector {
    samples: Mutex<Vec<(&'static str, usize)>>,
}

impl CountingCollector {
    pub fn counts(&self, point: &str) -> Vec<usize> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == point)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl StatisticsCollector for CountingCollector {
    fn submit(&self, measure_point: &'static str, element_count: usize, _elapsed: Duration) {
        self.samples
            .lock()
            .unwrap()
            .push((measure_point, element_count));
    }
}

pub async fn count(pool: &AnyPool, sql: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
    n
}

pub async fn instance_state(pool: &AnyPool, instance_id: &str) -> String {
    let (state,): (String,) = sqlx::query_as("SELECT state FROM workflow_instance WHERE id = $1")
        .bind(instance_id)
        .fetch_one(pool)
        .await
        .unwrap();
    state
}

/// Queue entries and wait states, without timestamps.
pub async fn snapshot(pool: &AnyPool) -> (Vec<(String, String, i64)>, Vec<(String, String)>) {
    let queue: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT instance_id, pool_id, priority FROM workflow_queue ORDER BY instance_id",
    )
    .fetch_all(pool)
    .await
    .unwrap();
    let waits: Vec<(String, String)> =
        sqlx::query_as("SELECT correlation_id, state FROM workflow_wait ORDER BY correlation_id")
            .fetch_all(pool)
            .await
            .unwrap();
    (queue, waits)
}

/// Dequeue from `pool_id` until something comes back or `timeout` passes.
pub async fn dequeue_eventually(
    queue: &JsonQueue,
    pool_id: &str,
    timeout: Duration,
) -> Vec<parkway_queue::WorkflowInstance<Value>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let found = queue.dequeue(pool_id, 10).await.unwrap();
        if !found.is_empty() || tokio::time::Instant::now() >= deadline {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Skip test if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
