// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::batcher::BatcherConfig;
use crate::reaper::ReaperConfig;
use crate::reconciler::ReconcilerConfig;
use crate::retry::RetryPolicy;

/// Process-level configuration for the standalone queue.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Engine settings
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `PARKWAY_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `PARKWAY_MAX_CONNECTIONS`: pool size (default: 10)
    /// - everything read by [`QueueConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("PARKWAY_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("PARKWAY_DATABASE_URL"))?;

        let max_connections = env_or("PARKWAY_MAX_CONNECTIONS", 10u32, "must be a positive integer")?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid(
                "PARKWAY_MAX_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            database_url,
            max_connections,
            queue: QueueConfig::from_env()?,
        })
    }
}

/// Engine settings shared by the queue and its background tasks.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delete finished instances (`true`) or keep them as `FINISHED` history.
    pub remove_when_finished: bool,
    /// Instances written per round-trip by batch insert.
    pub insert_chunk_size: usize,
    /// Instance ids per wait/response lookup during dequeue.
    pub response_lookup_chunk: usize,
    /// Retry policy for every store transaction.
    pub retry: RetryPolicy,
    /// Wait-reconciliation loop pacing.
    pub reconciler: ReconcilerConfig,
    /// Stale-response reaper schedule.
    pub reaper: ReaperConfig,
    /// Command batcher sizing.
    pub batcher: BatcherConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            remove_when_finished: true,
            insert_chunk_size: 100,
            response_lookup_chunk: 25,
            retry: RetryPolicy::default(),
            reconciler: ReconcilerConfig::default(),
            reaper: ReaperConfig::default(),
            batcher: BatcherConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Load engine settings from environment variables.
    ///
    /// - `PARKWAY_REMOVE_WHEN_FINISHED`: "true"/"1" or "false"/"0" (default: true)
    /// - `PARKWAY_INSERT_CHUNK_SIZE`: rows per insert round-trip (default: 100)
    /// - `PARKWAY_RESPONSE_LOOKUP_CHUNK`: ids per response lookup (default: 25)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let remove_when_finished = env_flag("PARKWAY_REMOVE_WHEN_FINISHED", defaults.remove_when_finished)?;
        let insert_chunk_size = env_positive("PARKWAY_INSERT_CHUNK_SIZE", defaults.insert_chunk_size)?;
        let response_lookup_chunk =
            env_positive("PARKWAY_RESPONSE_LOOKUP_CHUNK", defaults.response_lookup_chunk)?;

        Ok(Self {
            remove_when_finished,
            insert_chunk_size,
            response_lookup_chunk,
            retry: RetryPolicy::from_env()?,
            reconciler: ReconcilerConfig::from_env()?,
            reaper: ReaperConfig::from_env()?,
            batcher: BatcherConfig::from_env()?,
        })
    }

    /// Reject settings the engine cannot run with.
    ///
    /// The fields are public, so a config assembled in code never went
    /// through the checks in [`from_env`](Self::from_env).
    pub fn validate(&self) -> Result<(), ConfigError> {
        const POSITIVE: &str = "must be greater than zero";

        let sizes = [
            ("insert_chunk_size", self.insert_chunk_size),
            ("response_lookup_chunk", self.response_lookup_chunk),
            ("reconciler.promote_batch_size", self.reconciler.promote_batch_size),
            ("reconciler.recovery_batch_size", self.reconciler.recovery_batch_size),
            ("reaper.batch_size", self.reaper.batch_size),
            ("batcher.capacity", self.batcher.capacity),
            ("batcher.max_batch", self.batcher.max_batch),
        ];
        if let Some((name, _)) = sizes.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(name, POSITIVE));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts", POSITIVE));
        }
        Ok(())
    }
}

/// Read `key` and parse it, falling back to `default` when unset.
pub(crate) fn env_or<T: FromStr>(
    key: &'static str,
    default: T,
    hint: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key, hint)),
        Err(_) => Ok(default),
    }
}

/// Like [`env_or`] but rejects zero.
pub(crate) fn env_positive(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env_or(key, default, "must be a positive integer")? {
        0 => Err(ConfigError::Invalid(key, "must be a positive integer")),
        n => Ok(n),
    }
}

/// Duration given in milliseconds.
pub(crate) fn env_millis(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let ms = env_or(key, default.as_millis() as u64, "must be a number of milliseconds")?;
    Ok(Duration::from_millis(ms))
}

/// Duration given in seconds.
pub(crate) fn env_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = env_or(key, default.as_secs(), "must be a number of seconds")?;
    Ok(Duration::from_secs(secs))
}

pub(crate) fn env_flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::Invalid(key, "must be true/false or 1/0")),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
