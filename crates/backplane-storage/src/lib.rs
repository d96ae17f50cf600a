// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message stores for the Backplane message bus.
//!
//! [`SqliteStore`] is the durable backend: WAL-mode SQLite with embedded
//! migrations and a single-writer concurrency model via `tokio-rusqlite`.
//! [`MemoryStore`] keeps everything behind one mutex in-process.

pub mod adapter;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod queries;

use std::sync::Arc;

use backplane_config::model::{StorageBackend, StorageConfig};
use backplane_core::{BackplaneError, Clock, MessageStore};

pub use adapter::SqliteStore;
pub use database::Database;
pub use memory::MemoryStore;

/// Opens the store selected by `config.backend`.
pub async fn open_store(
    config: &StorageConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn MessageStore>, BackplaneError> {
    match config.backend {
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::open(config.clone(), clock).await?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new(clock))),
    }
}
