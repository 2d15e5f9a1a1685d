// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Smoke test against PostgreSQL (requires TEST_DATABASE_URL).

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use common::*;
use parkway_queue::{Response, WaitMode, WorkflowInstance};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_queue_round_trip() {
    skip_if_no_db!();

    let Some(ctx) = postgres_queue(test_config()).await else {
        eprintln!("Skipping test: failed to create test context");
        return;
    };
    ctx.queue.startup().await.unwrap();

    // A unique pool keeps this run apart from leftovers of earlier runs.
    let pool_id = format!("pg-{}", Uuid::new_v4());
    let instances: Vec<_> = (0..60)
        .map(|i| WorkflowInstance::new(pool_id.as_str(), i % 4, json!({ "n": i })))
        .collect();
    ctx.queue.insert_batch(&instances).await.unwrap();

    let queue = Arc::new(ctx.queue);
    let workers = (0..4).map(|_| {
        let queue = queue.clone();
        let pool_id = pool_id.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                let batch = queue.dequeue(&pool_id, 5).await.unwrap();
                if batch.is_empty() {
                    return seen;
                }
                seen.extend(batch);
            }
        })
    });
    let mut dequeued = Vec::new();
    for result in futures::future::join_all(workers).await {
        dequeued.extend(result.unwrap());
    }
    let unique: HashSet<_> = dequeued.iter().map(|i| i.id.clone()).collect();
    assert_eq!(dequeued.len(), 60);
    assert_eq!(unique.len(), 60);

    // Suspend one instance and wake it with a response.
    let correlation_id = format!("cb-{}", Uuid::new_v4());
    let suspended = &dequeued[0];
    queue
        .register_callback(suspended, vec![correlation_id.clone()], WaitMode::All, None)
        .await
        .unwrap();
    queue
        .notify(Response::new(correlation_id.clone(), Some(b"done".to_vec())))
        .await
        .unwrap();
    queue.flush().await.unwrap();

    let resumed = dequeue_eventually(&queue, &pool_id, Duration::from_secs(10)).await;
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].id, suspended.id);
    assert!(resumed[0].response(&correlation_id).is_some());

    for instance in dequeued.iter().skip(1).chain(resumed.iter()) {
        queue.finish(instance).await.unwrap();
    }
    queue.flush().await.unwrap();

    queue.shutdown().await.unwrap();
}
