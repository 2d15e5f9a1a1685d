// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection pool setup for either backend.

use std::path::Path;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::info;

use crate::config::Config;
use crate::dialect::Backend;
use crate::error::Result;

/// Connect to the database named by `config` and detect its backend.
///
/// SQLite files are created when missing.
pub async fn connect(config: &Config) -> Result<(AnyPool, Backend)> {
    let backend = Backend::from_url(&config.database_url)?;
    sqlx::any::install_default_drivers();

    let url = if backend == Backend::Sqlite && creates_file(&config.database_url) {
        with_param(&config.database_url, "mode=rwc")
    } else {
        config.database_url.clone()
    };

    let pool = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&url)
        .await?;

    info!(
        backend = backend.as_str(),
        max_connections = config.max_connections,
        "Database connection established"
    );

    Ok((pool, backend))
}

/// `sqlite:` URL for a database file, created on first connect.
pub fn sqlite_file_url(path: impl AsRef<Path>) -> String {
    format!("sqlite:{}?mode=rwc", path.as_ref().to_string_lossy())
}

/// File URL without an explicit open mode.
fn creates_file(url: &str) -> bool {
    !url.contains(":memory:") && !url.contains("mode=")
}

fn with_param(url: &str, param: &str) -> String {
    if url.contains('?') {
        format!("{url}&{param}")
    } else {
        format!("{url}?{param}")
    }
}
