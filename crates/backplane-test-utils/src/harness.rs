// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a store (wrapped in a [`FlakyStore`]), a drain
//! loop, and a retriever sharing one [`ManualClock`]. Tests publish with
//! [`TestHarness::publish`], drive the drain loop one cycle at a time with
//! [`TestHarness::drain`], and read with [`TestHarness::retrieve`].

use std::sync::Arc;
use std::time::Duration;

use backplane_bus::NotificationBus;
use backplane_config::model::{ProcessorConfig, StorageBackend, StorageConfig};
use backplane_core::{
    BackplaneError, Clock, ConsumerScope, LeaderElector, ManualClock, MessageStore,
    QueuedMessage, RetentionPolicy,
};
use backplane_processor::{CycleOutcome, LocalElector, MessageProcessor, RetentionResolver};
use backplane_retrieval::{Retrieved, Retriever};
use backplane_storage::{MemoryStore, SqliteStore};
use chrono::{DateTime, Utc};

use crate::flaky_store::FlakyStore;
use crate::mock_bus_config::MockBusConfig;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    backend: StorageBackend,
    start_millis: i64,
    processor: ProcessorConfig,
    max_messages: usize,
    buses: Vec<(String, u64, u64)>,
    leader: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: StorageBackend::Memory,
            start_millis: 1_000,
            processor: ProcessorConfig {
                idle_delay_ms: 10,
                conflict_backoff_ms: 10,
                fault_backoff_ms: 10,
                ..ProcessorConfig::default()
            },
            max_messages: backplane_retrieval::DEFAULT_MAX_MESSAGES,
            buses: Vec::new(),
            leader: true,
        }
    }

    /// Use a SQLite database in a temp directory instead of the memory store.
    pub fn with_sqlite(mut self) -> Self {
        self.backend = StorageBackend::Sqlite;
        self
    }

    /// Start the simulated clock at `millis` past the epoch.
    pub fn with_clock_at(mut self, millis: i64) -> Self {
        self.start_millis = millis;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.processor.batch_size = batch_size;
        self
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    /// Configure a retention policy for a bus.
    pub fn with_bus(mut self, name: &str, ttl_seconds: u64, sticky_ttl_seconds: u64) -> Self {
        self.buses
            .push((name.to_string(), ttl_seconds, sticky_ttl_seconds));
        self
    }

    /// Leave the node a follower; tests grant leadership themselves.
    pub fn as_follower(mut self) -> Self {
        self.leader = false;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, BackplaneError> {
        let clock = Arc::new(ManualClock::at_millis(self.start_millis));

        let (inner, temp_dir): (Arc<dyn MessageStore>, _) = match self.backend {
            StorageBackend::Memory => (Arc::new(MemoryStore::new(clock.clone())), None),
            StorageBackend::Sqlite => {
                let temp_dir = tempfile::TempDir::new().map_err(BackplaneError::storage)?;
                let config = StorageConfig {
                    database_path: temp_dir.path().join("test.db").to_string_lossy().to_string(),
                    ..StorageConfig::default()
                };
                let store = SqliteStore::open(config, clock.clone()).await?;
                (Arc::new(store), Some(temp_dir))
            }
        };
        let store = Arc::new(FlakyStore::new(inner));

        let bus_config = Arc::new(MockBusConfig::new());
        for (name, ttl, sticky_ttl) in &self.buses {
            bus_config.set(name, *ttl, *sticky_ttl).await;
        }

        let elector = Arc::new(LocalElector::new());
        if self.leader {
            elector.grant();
        }
        let notifications = Arc::new(NotificationBus::new());

        let retention = RetentionResolver::new(
            bus_config.clone(),
            clock.clone(),
            RetentionPolicy::default(),
            Duration::from_secs(10),
        );
        let processor = Arc::new(MessageProcessor::new(
            store.clone(),
            retention,
            elector.subscribe(),
            notifications.clone(),
            clock.clone(),
            self.processor,
        ));
        let retriever = Retriever::new(store.clone(), self.max_messages);

        Ok(TestHarness {
            clock,
            store,
            bus_config,
            elector,
            notifications,
            processor,
            retriever,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment over one store and one simulated clock.
pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    /// The store every component shares, with fault injection.
    pub store: Arc<FlakyStore>,
    pub bus_config: Arc<MockBusConfig>,
    pub elector: Arc<LocalElector>,
    pub notifications: Arc<NotificationBus>,
    pub processor: Arc<MessageProcessor>,
    pub retriever: Retriever,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Enqueue a message stamped with `producer_millis`. Returns its queue position.
    pub async fn publish(
        &self,
        bus: &str,
        channel: &str,
        sticky: bool,
        payload: serde_json::Value,
        producer_millis: i64,
    ) -> Result<u64, BackplaneError> {
        let stamp = DateTime::<Utc>::from_timestamp_millis(producer_millis)
            .ok_or_else(|| BackplaneError::Internal(format!("{producer_millis}ms out of range")))?;
        let queued = QueuedMessage::new(bus, channel, payload, stamp).sticky(sticky);
        self.store.enqueue(queued.encode()?).await
    }

    /// Enqueue a message stamped with the simulated clock's current time.
    pub async fn publish_now(
        &self,
        bus: &str,
        channel: &str,
        payload: serde_json::Value,
    ) -> Result<u64, BackplaneError> {
        self.publish(bus, channel, false, payload, self.clock.now_millis())
            .await
    }

    /// Run one drain cycle.
    pub async fn drain(&self) -> Result<CycleOutcome, BackplaneError> {
        self.processor.run_cycle().await
    }

    /// Run drain cycles until the queue is empty. Returns the number of batches committed.
    pub async fn drain_all(&self) -> Result<usize, BackplaneError> {
        let mut batches = 0;
        loop {
            match self.drain().await? {
                CycleOutcome::Idle | CycleOutcome::Abandoned => return Ok(batches),
                CycleOutcome::Committed { .. } => batches += 1,
            }
        }
    }

    pub async fn retrieve(
        &self,
        scope: &ConsumerScope,
        since: &str,
    ) -> Result<Retrieved, BackplaneError> {
        self.retriever.retrieve(scope, since).await
    }

    /// Move the simulated clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }
}
