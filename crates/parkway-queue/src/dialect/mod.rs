// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend-specific SQL hooks.
//!
//! The engine is written once against `sqlx::Any`. The only statements that
//! differ per backend are the three that need row locking: the dequeue
//! claim, the promotable-instance scan and the stale-response delete.
//! Every other statement is portable.

pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

pub use self::postgres::PostgresDialect;
pub use self::sqlite::SqliteDialect;

use crate::config::ConfigError;

/// Locking query hooks implemented per backend.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Select up to `$2` queue entries of pool `$1`, highest priority first,
    /// oldest first among equal priorities, locked so concurrent dequeuers
    /// skip them.
    ///
    /// Columns: `instance_id`, `priority`, `payload`, `created_at`.
    fn dequeue_query(&self) -> &'static str;

    /// Select up to `$2` instances in state `WAITING` whose waits are
    /// satisfied, either by enough responses or by a timeout at or before
    /// `$1` (epoch millis).
    ///
    /// Columns: `instance_id`, `pool_id`, `priority`; one row per instance.
    fn promotable_query(&self) -> &'static str;

    /// Delete up to `$2` responses that arrived before `$1` (epoch millis)
    /// and have no matching wait.
    fn delete_stale_responses_query(&self) -> &'static str;
}

/// Supported store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgreSQL; locking queries use `FOR UPDATE SKIP LOCKED`.
    Postgres,
    /// SQLite; a write transaction already excludes other writers.
    Sqlite,
}

impl Backend {
    /// Detect the backend from a connection URL.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(ConfigError::Invalid(
                "PARKWAY_DATABASE_URL",
                "must start with postgres://, postgresql:// or sqlite:",
            ))
        }
    }

    /// Query hooks for this backend.
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        match self {
            Self::Postgres => Arc::new(PostgresDialect),
            Self::Sqlite => Arc::new(SqliteDialect),
        }
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}
