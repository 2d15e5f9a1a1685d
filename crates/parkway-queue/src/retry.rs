// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transactional retry wrapper.
//!
//! Every statement the engine issues runs inside [`TxRunner::run`]: begin,
//! execute the unit of work, commit. Transient failures roll back and retry
//! with a linear delay; anything else rolls back and propagates at once.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{AnyConnection, AnyPool};
use tracing::{debug, warn};

use crate::config::{ConfigError, env_millis, env_or};
use crate::error::{QueueError, Result};

/// Upper bound on the delay between two attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attempt budget and pacing for [`TxRunner`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; grows linearly.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Load the policy from environment variables.
    ///
    /// - `PARKWAY_TX_MAX_ATTEMPTS`: attempts per transaction (default: 5)
    /// - `PARKWAY_TX_RETRY_DELAY_MS`: base delay in milliseconds (default: 100)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_attempts = env_or("PARKWAY_TX_MAX_ATTEMPTS", defaults.max_attempts, "must be a positive integer")?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "PARKWAY_TX_MAX_ATTEMPTS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            max_attempts,
            base_delay: env_millis("PARKWAY_TX_RETRY_DELAY_MS", defaults.base_delay)?,
        })
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(MAX_RETRY_DELAY)
    }
}

/// A unit of work executed inside one transaction.
///
/// `execute` may run any number of statements on `conn`; the runner owns
/// begin, commit and rollback. It must be safe to call again after a
/// rollback.
#[async_trait]
pub trait Transactional: Send + Sync {
    /// Value produced by a committed attempt.
    type Output: Send;

    /// Operation name used in logs and in [`QueueError::RetriesExhausted`].
    fn operation(&self) -> &'static str;

    /// Run the statements of this unit.
    async fn execute(&self, conn: &mut AnyConnection) -> Result<Self::Output>;
}

/// Runs [`Transactional`] units against a pool with retries.
#[derive(Debug, Clone)]
pub struct TxRunner {
    pool: AnyPool,
    policy: RetryPolicy,
}

impl TxRunner {
    /// Create a runner.
    pub fn new(pool: AnyPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `work` in a transaction, retrying transient failures.
    pub async fn run<W>(&self, work: &W) -> Result<W::Output>
    where
        W: Transactional + ?Sized,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.attempt(work).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.policy.max_attempts {
                return Err(QueueError::RetriesExhausted {
                    operation: work.operation(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                operation = work.operation(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient store failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<W>(&self, work: &W) -> Result<W::Output>
    where
        W: Transactional + ?Sized,
    {
        let mut tx = self.pool.begin().await?;
        match work.execute(&mut *tx).await {
            Ok(output) => {
                tx.commit().await?;
                Ok(output)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    debug!(
                        operation = work.operation(),
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{ENV_MUTEX, EnvGuard};
    use crate::test_util::memory_pool;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl Transactional for Flaky {
        type Output = u32;

        fn operation(&self) -> &'static str {
            "flaky"
        }

        async fn execute(&self, _conn: &mut AnyConnection) -> Result<u32> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(QueueError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(n)
        }
    }

    struct InsertThenFail;

    #[async_trait]
    impl Transactional for InsertThenFail {
        type Output = ();

        fn operation(&self) -> &'static str {
            "insert_then_fail"
        }

        async fn execute(&self, conn: &mut AnyConnection) -> Result<()> {
            sqlx::query(
                "INSERT INTO workflow_response (correlation_id, payload, arrived_at) VALUES ($1, NULL, 0)",
            )
            .bind("rolled-back")
            .execute(&mut *conn)
            .await?;
            Err(QueueError::InvalidArgument("boom".into()))
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_delay_is_linear_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(500), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_policy_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PARKWAY_TX_MAX_ATTEMPTS", "7");
        guard.set("PARKWAY_TX_RETRY_DELAY_MS", "20");
        let policy = RetryPolicy::from_env().unwrap();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.base_delay, Duration::from_millis(20));

        guard.set("PARKWAY_TX_MAX_ATTEMPTS", "0");
        assert!(RetryPolicy::from_env().is_err());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let runner = TxRunner::new(memory_pool().await, fast_policy(5));
        let work = Flaky {
            calls: AtomicU32::new(0),
            failures: 2,
        };

        assert_eq!(runner.run(&work).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_wrap_last_error() {
        let runner = TxRunner::new(memory_pool().await, fast_policy(3));
        let work = Flaky {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        };

        let err = runner.run(&work).await.unwrap_err();
        match err {
            QueueError::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "flaky");
                assert_eq!(attempts, 3);
                assert!(source.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(work.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_rolls_back_without_retry() {
        let pool = memory_pool().await;
        let runner = TxRunner::new(pool.clone(), fast_policy(5));

        let err = runner.run(&InsertThenFail).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflow_response")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
