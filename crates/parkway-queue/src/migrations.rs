// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for parkway-queue.
//!
//! The schema is embedded per backend. Products embedding the queue call
//! [`run`] once before building a [`PersistentQueue`](crate::PersistentQueue).
//!
//! # Example
//!
//! ```ignore
//! use parkway_queue::{db, migrations};
//!
//! let (pool, backend) = db::connect(&config).await?;
//! migrations::run(&pool, backend).await?;
//! ```

use sqlx::AnyPool;
use sqlx::migrate::MigrateError;

use crate::dialect::Backend;

/// PostgreSQL migrator with the queue schema embedded.
pub static POSTGRES: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgresql");

/// SQLite migrator with the queue schema embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Apply pending migrations for `backend`.
///
/// Safe to call multiple times; already-applied migrations are skipped.
pub async fn run(pool: &AnyPool, backend: Backend) -> Result<(), MigrateError> {
    match backend {
        Backend::Postgres => POSTGRES.run(pool).await,
        Backend::Sqlite => SQLITE.run(pool).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{count, memory_pool};

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run(&pool, Backend::Sqlite).await.unwrap();

        for table in [
            "workflow_instance",
            "workflow_queue",
            "workflow_wait",
            "workflow_response",
        ] {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            assert_eq!(count(&pool, &sql).await, 0);
        }
    }
}
