// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared handle to the relational store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sqlx::AnyPool;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::retry::{RetryPolicy, Transactional, TxRunner};
use crate::stats::StatisticsCollector;

/// Pool, retry wrapper, dialect hooks and statistics sink.
///
/// Cheap to clone; the engine and each background task hold their own copy.
#[derive(Clone)]
pub struct Store {
    runner: TxRunner,
    dialect: Arc<dyn Dialect>,
    statistics: Arc<dyn StatisticsCollector>,
}

impl Store {
    /// Create a store handle.
    pub fn new(
        pool: AnyPool,
        dialect: Arc<dyn Dialect>,
        retry: RetryPolicy,
        statistics: Arc<dyn StatisticsCollector>,
    ) -> Self {
        Self {
            runner: TxRunner::new(pool, retry),
            dialect,
            statistics,
        }
    }

    /// Run `work` in a retried transaction.
    pub async fn run<W>(&self, work: &W) -> Result<W::Output>
    where
        W: Transactional + ?Sized,
    {
        self.runner.run(work).await
    }

    /// The connection pool.
    pub fn pool(&self) -> &AnyPool {
        self.runner.pool()
    }

    /// Backend query hooks.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Report a sample to the statistics collector.
    pub fn record(&self, measure_point: &'static str, element_count: usize, elapsed: Duration) {
        self.statistics.submit(measure_point, element_count, elapsed);
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dialect", &self.dialect)
            .field("retry", self.runner.policy())
            .finish_non_exhaustive()
    }
}

/// Comma-separated `$n` placeholders starting at `$first`.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ")
}
