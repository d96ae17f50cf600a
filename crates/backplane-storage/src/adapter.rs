// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the MessageStore trait.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use backplane_config::model::StorageConfig;
use backplane_core::{
    AdapterType, BackplaneError, Clock, HealthStatus, LastAssigned, Message, MessageId,
    MessageStore, PluginAdapter, QueueEntry, ScanFilter, StagedBatch, WatchToken,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed message store.
///
/// The database is opened by [`SqliteStore::initialize`]; [`MessageStore::reconnect`]
/// swaps in a freshly opened handle without disturbing concurrent readers.
pub struct SqliteStore {
    config: StorageConfig,
    clock: Arc<dyn Clock>,
    db: ArcSwapOption<Database>,
}

impl SqliteStore {
    /// Create a store for the given configuration.
    ///
    /// The database is not opened until [`initialize`](Self::initialize) is called.
    pub fn new(config: StorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            db: ArcSwapOption::empty(),
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig, clock: Arc<dyn Clock>) -> Result<Self, BackplaneError> {
        let store = Self::new(config, clock);
        store.initialize().await?;
        Ok(store)
    }

    /// Opens the database and runs migrations.
    pub async fn initialize(&self) -> Result<(), BackplaneError> {
        if self.db.load().is_some() {
            return Err(BackplaneError::storage("storage already initialized"));
        }
        let db = Database::open_with(&self.config).await?;
        self.db.store(Some(Arc::new(db)));
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    fn db(&self) -> Result<Arc<Database>, BackplaneError> {
        self.db
            .load_full()
            .ok_or_else(|| BackplaneError::storage("storage not initialized -- call initialize() first"))
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_millis()
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BackplaneError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BackplaneError> {
        if let Some(db) = self.db.swap(None) {
            db.checkpoint().await?;
            info!("SQLite store shut down");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<u64, BackplaneError> {
        queries::queue::enqueue(&*self.db()?, payload).await
    }

    async fn queue_len(&self) -> Result<usize, BackplaneError> {
        queries::queue::queue_len(&*self.db()?).await
    }

    async fn peek_queue(&self, max: usize) -> Result<Vec<QueueEntry>, BackplaneError> {
        queries::queue::peek(&*self.db()?, max).await
    }

    async fn watch(&self) -> Result<WatchToken, BackplaneError> {
        queries::index::watch(&*self.db()?).await
    }

    async fn last_assigned(&self) -> Result<Option<LastAssigned>, BackplaneError> {
        queries::messages::last_assigned(&*self.db()?).await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, BackplaneError> {
        queries::messages::get(&*self.db()?, id, self.now_ms()).await
    }

    async fn scan(
        &self,
        filter: &ScanFilter,
        since: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, BackplaneError> {
        queries::messages::scan(&*self.db()?, filter, since, limit, self.now_ms()).await
    }

    async fn commit(&self, token: WatchToken, batch: StagedBatch) -> Result<(), BackplaneError> {
        queries::index::commit(&*self.db()?, token, batch, self.now_ms()).await
    }

    async fn purge_expired(&self) -> Result<usize, BackplaneError> {
        queries::index::purge_expired(&*self.db()?, self.now_ms()).await
    }

    async fn reconnect(&self) -> Result<(), BackplaneError> {
        let fresh = Database::open_with(&self.config).await?;
        if let Some(old) = self.db.swap(Some(Arc::new(fresh)))
            && let Err(e) = old.checkpoint().await
        {
            warn!(error = %e, "checkpoint on discarded connection failed");
        }
        info!(path = %self.config.database_path, "SQLite store reconnected");
        Ok(())
    }
}
