// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Crash recovery, run once at startup before any background task.
//!
//! Phase 1 rebuilds the ready queue from instance state in one transaction:
//! the queue is cleared, every `READY` instance is requeued, and every
//! `SATISFIED` wait is reset to `WAITING` so interrupted promotions are
//! redone. Phase 2 drains the promotion backlog by running passes until one
//! promotes nothing.

use async_trait::async_trait;
use sqlx::AnyConnection;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{ProcessingState, WaitState, now_millis};
use crate::reconciler::promote_ready;
use crate::retry::Transactional;
use crate::store::Store;

/// Counts reported by [`recover`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Queue entries rebuilt from `READY` instances.
    pub requeued: u64,
    /// Waits reset from `SATISFIED` to `WAITING`.
    pub waits_reset: u64,
    /// Instances promoted while draining the backlog.
    pub promoted: usize,
}

struct RebuildQueue;

#[async_trait]
impl Transactional for RebuildQueue {
    type Output = (u64, u64);

    fn operation(&self) -> &'static str {
        "rebuild_queue"
    }

    async fn execute(&self, conn: &mut AnyConnection) -> Result<(u64, u64)> {
        sqlx::query("DELETE FROM workflow_queue")
            .execute(&mut *conn)
            .await?;

        let requeued = sqlx::query(
            "INSERT INTO workflow_queue (instance_id, pool_id, priority, last_modified_at) \
             SELECT id, pool_id, priority, last_modified_at FROM workflow_instance WHERE state = $1",
        )
        .bind(ProcessingState::Ready.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let waits_reset = sqlx::query(
            "UPDATE workflow_wait SET state = $1 WHERE state = $2",
        )
        .bind(WaitState::Waiting.as_str())
        .bind(WaitState::Satisfied.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok((requeued, waits_reset))
    }
}

/// Restore queue and wait consistency after an unclean shutdown.
///
/// `batch_size` caps each promotion pass of phase 2. Any failure is returned
/// to the caller; the engine must not serve dequeues after one.
pub async fn recover(store: &Store, batch_size: usize) -> Result<RecoveryReport> {
    let started_at = now_millis();
    let (requeued, waits_reset) = store.run(&RebuildQueue).await?;
    debug!(requeued, waits_reset, "Ready queue rebuilt");

    let mut promoted = 0;
    loop {
        let pass = promote_ready(store, batch_size).await?;
        if pass == 0 {
            break;
        }
        promoted += pass;
    }

    info!(
        requeued,
        waits_reset,
        promoted,
        elapsed_ms = now_millis() - started_at,
        "Crash recovery completed"
    );

    Ok(RecoveryReport {
        requeued,
        waits_reset,
        promoted,
    })
}
