// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Timing samples for store operations.
//!
//! Collectors are purely observational: `submit` returns nothing, so a
//! collector can never fail the operation it measures.

use std::time::Duration;

use tracing::debug;

/// Measure point names passed to [`StatisticsCollector::submit`].
pub mod points {
    /// One insert chunk.
    pub const INSERT: &str = "queue.insert";
    /// One dequeue transaction.
    pub const DEQUEUE: &str = "queue.dequeue";
    /// Queue-entry deletion inside dequeue.
    pub const DELETE: &str = "queue.delete";
    /// One reconciliation pass.
    pub const PROMOTE: &str = "queue.promote";
    /// One reaper batch.
    pub const DELETE_STALE_RESPONSES: &str = "queue.delete_stale_responses";
    /// One batcher transaction.
    pub const BATCHER_APPLY: &str = "batcher.apply";
}

/// Receives (operation, row count, elapsed) samples.
pub trait StatisticsCollector: Send + Sync {
    /// Record one sample.
    fn submit(&self, measure_point: &'static str, element_count: usize, elapsed: Duration);
}

/// Discards every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatisticsCollector;

impl StatisticsCollector for NullStatisticsCollector {
    fn submit(&self, _measure_point: &'static str, _element_count: usize, _elapsed: Duration) {}
}

/// Emits every sample as a `debug` tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatisticsCollector;

impl StatisticsCollector for TracingStatisticsCollector {
    fn submit(&self, measure_point: &'static str, element_count: usize, elapsed: Duration) {
        debug!(
            measure_point,
            element_count,
            elapsed_us = elapsed.as_micros() as u64,
            "statistics sample"
        );
    }
}
