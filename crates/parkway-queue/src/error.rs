// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for parkway-queue.
//!
//! Store failures are classified as transient or permanent so the
//! transactional retry wrapper knows whether another attempt can succeed.

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;

/// Result type using [`QueueError`].
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by the queue engine and its background tasks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying schema migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Encoding or decoding a workflow payload failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A transient failure kept recurring until the attempt budget ran out.
    #[error("'{operation}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Operation that was retried.
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        source: Box<QueueError>,
    },

    /// The operation is not supported by this engine.
    #[error("Operation '{0}' is not supported")]
    Unsupported(&'static str),

    /// The queue has not been started (or has already been shut down).
    #[error("Queue is not running; call startup() first")]
    NotStarted,

    /// `startup()` was called on a queue that was already started.
    #[error("Queue has already been started")]
    AlreadyStarted,

    /// Startup failed; the queue must not serve dequeues.
    #[error("Startup failed: {0}")]
    Startup(#[source] Box<QueueError>),

    /// The command batcher no longer accepts commands.
    #[error("Command batcher is closed")]
    BatcherClosed,

    /// The command batcher channel is at capacity.
    #[error("Command batcher is full")]
    BatcherFull,

    /// Caller supplied an argument the operation cannot work with.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl QueueError {
    /// Whether retrying the surrounding transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => is_transient(e),
            _ => false,
        }
    }
}

/// PostgreSQL SQLSTATEs worth another attempt.
const PG_TRANSIENT_STATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57P01", // admin_shutdown
    "57P03", // cannot_connect_now
];

/// SQLite primary result codes worth another attempt (BUSY, LOCKED).
const SQLITE_TRANSIENT_CODES: &[i64] = &[5, 6];

/// Classify a sqlx error as transient (connection loss, lock conflicts) or permanent.
///
/// Numeric result codes are only interpreted for errors raised by SQLite;
/// every other driver reports a SQLSTATE, some of which are all digits.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let Some(code) = db.code() else {
                return false;
            };
            let code: &str = &code;
            if db.try_downcast_ref::<sqlx::sqlite::SqliteError>().is_some() {
                sqlite_code_is_transient(code)
            } else {
                PG_TRANSIENT_STATES.contains(&code) || code.starts_with("08")
            }
        }
        _ => false,
    }
}

/// SQLite reports extended result codes; the primary code is the low byte.
fn sqlite_code_is_transient(code: &str) -> bool {
    code.parse::<i64>()
        .map(|n| SQLITE_TRANSIENT_CODES.contains(&(n & 0xff)))
        .unwrap_or(false)
}
