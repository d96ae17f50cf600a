// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The drain loop.
//!
//! While this node holds leadership, [`MessageProcessor`] repeatedly moves a
//! batch from the head of the inbound queue into the ordered indices:
//!
//! 1. take a watch token on the GlobalIndex version,
//! 2. read the last assigned id and peek up to `batch_size` queue entries,
//! 3. decode each entry, resolve its retention, and chain its id forward,
//! 4. commit bodies, indices, and the dequeue as one conditional transaction.
//!
//! A rejected commit leaves everything on the queue for the next cycle. The
//! last assigned id is always re-read from the store, never carried between
//! cycles, so a leadership handoff cannot reorder ids.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use backplane_bus::{MessageCommitted, NotificationBus};
use backplane_config::model::ProcessorConfig;
use backplane_core::{
    BackplaneError, Clock, LastAssigned, LeadershipState, MessageId, MessageStore,
    QueuedMessage, StagedBatch, StagedMessage, next_id,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::recording;
use crate::retention::RetentionResolver;

/// Queue latency above this many milliseconds (48 minutes) is reported as bizarre.
pub const MAX_SANE_LATENCY_MS: i64 = 2_880_000;

/// Observable state of the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Waiting for a leadership grant.
    NotLeader,
    Draining,
    /// `run` has returned.
    Stopped,
}

/// What a single drain cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The inbound queue was empty.
    Idle,
    /// A batch was committed. `skipped` counts malformed entries that were
    /// dequeued without being persisted.
    Committed {
        count: usize,
        skipped: usize,
        newest: Option<MessageId>,
    },
    /// Leadership was lost before the commit was issued.
    Abandoned,
}

enum DrainExit {
    Cancelled,
    Revoked,
    SourceClosed,
}

pub struct MessageProcessor {
    store: Arc<dyn MessageStore>,
    retention: RetentionResolver,
    leadership: watch::Receiver<LeadershipState>,
    notifications: Arc<NotificationBus>,
    clock: Arc<dyn Clock>,
    config: ProcessorConfig,
    state: watch::Sender<DrainState>,
    needs_reconnect: AtomicBool,
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn MessageStore>,
        retention: RetentionResolver,
        leadership: watch::Receiver<LeadershipState>,
        notifications: Arc<NotificationBus>,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Self {
        let (state, _) = watch::channel(DrainState::NotLeader);
        Self {
            store,
            retention,
            leadership,
            notifications,
            clock,
            config,
            state,
            needs_reconnect: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> DrainState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DrainState> {
        self.state.subscribe()
    }

    pub fn retention(&self) -> &RetentionResolver {
        &self.retention
    }

    /// Runs until `cancel` fires or the leadership source goes away.
    ///
    /// Drains only while leadership is held, and stops issuing writes as
    /// soon as a revocation is observed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BackplaneError> {
        let mut leadership = self.leadership.clone();
        info!(batch_size = self.config.batch_size, "drain loop started");

        loop {
            let current = *leadership.borrow_and_update();
            let LeadershipState::Leader { term } = current else {
                self.set_state(DrainState::NotLeader);
                tokio::select! {
                    changed = leadership.changed() => {
                        if changed.is_err() {
                            info!("leadership source closed");
                            break;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
                continue;
            };

            info!(term, "leader elected, draining inbound queue");
            self.set_state(DrainState::Draining);
            match self.drain(&mut leadership, &cancel).await {
                DrainExit::Cancelled => break,
                DrainExit::SourceClosed => {
                    info!("leadership source closed");
                    break;
                }
                DrainExit::Revoked => {
                    info!(term, "leadership lost, drain paused");
                }
            }
        }

        self.set_state(DrainState::Stopped);
        info!("drain loop stopped");
        Ok(())
    }

    async fn drain(
        &self,
        leadership: &mut watch::Receiver<LeadershipState>,
        cancel: &CancellationToken,
    ) -> DrainExit {
        let mut last_purge = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return DrainExit::Cancelled;
            }
            if !leadership.borrow_and_update().is_leader() {
                return DrainExit::Revoked;
            }

            let delay = if self.needs_reconnect.load(Ordering::SeqCst) {
                self.reconnect().await
            } else if last_purge.elapsed() >= self.config.cleanup_interval() {
                last_purge = Instant::now();
                self.purge().await;
                None
            } else {
                self.cycle_delay().await
            };

            let Some(delay) = delay else { continue };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return DrainExit::Cancelled,
                changed = leadership.changed() => {
                    if changed.is_err() {
                        return DrainExit::SourceClosed;
                    }
                }
            }
        }
    }

    /// Runs one cycle and turns its result into the pause before the next one.
    async fn cycle_delay(&self) -> Option<std::time::Duration> {
        match self.run_cycle().await {
            Ok(CycleOutcome::Idle) => Some(self.config.idle_delay()),
            Ok(CycleOutcome::Committed { .. }) | Ok(CycleOutcome::Abandoned) => None,
            Err(e @ BackplaneError::TransactionConflict { .. }) => {
                warn!(error = %e, "transaction failed, halting work for now");
                recording::record_conflict();
                Some(self.config.conflict_backoff())
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "storage fault, discarding connection");
                recording::record_storage_fault();
                self.needs_reconnect.store(true, Ordering::SeqCst);
                Some(self.config.fault_backoff())
            }
            Err(e) => {
                error!(error = %e, "drain cycle failed");
                Some(self.config.fault_backoff())
            }
        }
    }

    async fn reconnect(&self) -> Option<std::time::Duration> {
        match self.store.reconnect().await {
            Ok(()) => {
                self.needs_reconnect.store(false, Ordering::SeqCst);
                info!(store = self.store.name(), "storage reconnected");
                None
            }
            Err(e) => {
                warn!(error = %e, "storage reconnect failed");
                recording::record_storage_fault();
                Some(self.config.fault_backoff())
            }
        }
    }

    /// Removes expired bodies and their index entries.
    pub async fn purge(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(0) => 0,
            Ok(removed) => {
                info!(removed, "purged expired messages");
                removed
            }
            Err(e) => {
                warn!(error = %e, "expired message purge failed");
                if matches!(e, BackplaneError::StorageUnavailable { .. }) {
                    recording::record_storage_fault();
                    self.needs_reconnect.store(true, Ordering::SeqCst);
                }
                0
            }
        }
    }

    /// Drains one batch from the head of the inbound queue.
    ///
    /// Errors are returned unhandled; [`run`](Self::run) maps them to backoff.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, BackplaneError> {
        let token = self.store.watch().await?;
        let mut last = self
            .store
            .last_assigned()
            .await?
            .unwrap_or_else(LastAssigned::epoch);

        let entries = self.store.peek_queue(self.config.batch_size).await?;
        let Some(dequeue_through) = entries.last().map(|e| e.position) else {
            return Ok(CycleOutcome::Idle);
        };

        let mut staged = Vec::with_capacity(entries.len());
        let mut arrivals = Vec::with_capacity(entries.len());
        let mut skipped = 0;

        for entry in entries {
            let queued = match QueuedMessage::decode(&entry.payload) {
                Ok(queued) => queued,
                Err(e) => {
                    warn!(position = entry.position, error = %e, "skipping malformed queue entry");
                    recording::record_malformed();
                    skipped += 1;
                    continue;
                }
            };

            let ttl = self
                .retention
                .resolve(&queued.bus)
                .await
                .ttl_for(queued.sticky);
            let next = match next_id(&last, queued.producer_timestamp) {
                Ok(next) => next,
                Err(e) => {
                    warn!(position = entry.position, error = %e, "skipping unorderable queue entry");
                    recording::record_malformed();
                    skipped += 1;
                    continue;
                }
            };
            debug!(
                old = %MessageId::from_timestamp(queued.producer_timestamp),
                new = %next.id,
                bus = %queued.bus,
                channel = %queued.channel,
                "pipelined message"
            );

            arrivals.push(queued.producer_timestamp.timestamp_millis());
            staged.push(StagedMessage {
                message: queued.into_message(next.id.clone()),
                ttl,
            });
            last = next;
        }

        if !self.leadership.borrow().is_leader() {
            info!("leadership lost mid-cycle, abandoning batch");
            return Ok(CycleOutcome::Abandoned);
        }

        let batch = StagedBatch {
            messages: staged,
            dequeue_through: Some(dequeue_through),
        };
        let count = batch.messages.len();
        let newest = batch.newest_id().cloned();

        debug!(count, skipped, "processing transaction");
        self.store.commit(token, batch).await?;

        self.record_latency(&arrivals);
        recording::record_committed(count);

        match &newest {
            Some(newest) => {
                info!(count, skipped, newest = %newest, "flushed batch");
                self.notifications.publish(MessageCommitted::new(
                    newest.clone(),
                    count,
                    self.clock.now(),
                ));
            }
            None => info!(skipped, "dequeued batch of malformed entries"),
        }

        Ok(CycleOutcome::Committed {
            count,
            skipped,
            newest,
        })
    }

    fn record_latency(&self, arrivals: &[i64]) {
        let now = self.clock.now_millis();
        for arrival in arrivals {
            let latency = now - arrival;
            recording::record_time_in_queue(latency);
            if !(0..=MAX_SANE_LATENCY_MS).contains(&latency) {
                warn!(latency_ms = latency, "time in queue is bizarre");
            }
        }
    }

    fn set_state(&self, state: DrainState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("store", &self.store.name())
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use backplane_config::BusConfig;
    use backplane_core::{LeaderElector, MAX_ID_MILLIS, ManualClock, RetentionPolicy, ScanFilter};
    use backplane_storage::MemoryStore;
    use chrono::{DateTime, Utc};
    use tracing_test::traced_test;

    use super::*;
    use crate::leadership::LocalElector;
    use crate::static_config::StaticBusConfig;

    struct Setup {
        processor: Arc<MessageProcessor>,
        store: Arc<MemoryStore>,
        elector: Arc<LocalElector>,
        bus: Arc<NotificationBus>,
        clock: Arc<ManualClock>,
    }

    fn setup_with(config: ProcessorConfig) -> Setup {
        let clock = Arc::new(ManualClock::at_millis(10_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let elector = Arc::new(LocalElector::new());
        let bus = Arc::new(NotificationBus::new());
        let buses = StaticBusConfig::new(&[BusConfig {
            name: "sticky".into(),
            retention_time_seconds: 30,
            retention_time_sticky_seconds: 3600,
        }]);
        let retention = RetentionResolver::new(
            Arc::new(buses),
            clock.clone(),
            RetentionPolicy::default(),
            Duration::from_secs(10),
        );
        let processor = Arc::new(MessageProcessor::new(
            store.clone(),
            retention,
            elector.subscribe(),
            bus.clone(),
            clock.clone(),
            config,
        ));
        Setup {
            processor,
            store,
            elector,
            bus,
            clock,
        }
    }

    fn setup() -> Setup {
        setup_with(ProcessorConfig::default())
    }

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap()
    }

    async fn publish(store: &MemoryStore, bus: &str, channel: &str, millis: i64) {
        let queued = QueuedMessage::new(bus, channel, serde_json::json!({"n": millis}), at(millis));
        store.enqueue(queued.encode().unwrap()).await.unwrap();
    }

    fn millis_of(outcome: &CycleOutcome) -> i64 {
        match outcome {
            CycleOutcome::Committed {
                newest: Some(id), ..
            } => id.millis().unwrap(),
            other => panic!("expected a committed batch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let s = setup();
        s.elector.grant();
        assert_eq!(s.processor.run_cycle().await.unwrap(), CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn same_timestamp_messages_get_consecutive_ids() {
        let s = setup();
        s.elector.grant();
        publish(&s.store, "b", "c1", 1_000).await;
        publish(&s.store, "b", "c2", 1_000).await;

        let outcome = s.processor.run_cycle().await.unwrap();
        assert_eq!(millis_of(&outcome), 1_001);

        let all = s
            .store
            .scan(&ScanFilter::Buses(["b".to_string()].into()), None, 10)
            .await
            .unwrap();
        let ids: Vec<i64> = all.iter().map(|m| m.id.millis().unwrap()).collect();
        assert_eq!(ids, vec![1_000, 1_001]);
        assert_eq!(all[0].channel, "c1");
        assert_eq!(s.store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ids_chain_from_the_persisted_tail_across_cycles() {
        let s = setup_with(ProcessorConfig {
            batch_size: 1,
            ..ProcessorConfig::default()
        });
        s.elector.grant();
        publish(&s.store, "b", "c", 5_000).await;
        publish(&s.store, "b", "c", 4_000).await;

        assert_eq!(millis_of(&s.processor.run_cycle().await.unwrap()), 5_000);
        assert_eq!(millis_of(&s.processor.run_cycle().await.unwrap()), 5_001);
        assert_eq!(s.processor.run_cycle().await.unwrap(), CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn batch_size_bounds_each_cycle() {
        let s = setup_with(ProcessorConfig {
            batch_size: 2,
            ..ProcessorConfig::default()
        });
        s.elector.grant();
        for i in 0..5 {
            publish(&s.store, "b", "c", 1_000 + i).await;
        }
        s.processor.run_cycle().await.unwrap();
        assert_eq!(s.store.queue_len().await.unwrap(), 3);
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_entries_are_skipped_and_dequeued() {
        let s = setup();
        s.elector.grant();
        publish(&s.store, "b", "c", 1_000).await;
        s.store.enqueue(b"not json".to_vec()).await.unwrap();
        publish(&s.store, "b", "c", 2_000).await;

        let outcome = s.processor.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Committed {
                count: 2,
                skipped: 1,
                newest: Some(MessageId::from_millis(2_000).unwrap()),
            }
        );
        assert_eq!(s.store.queue_len().await.unwrap(), 0);
        assert!(logs_contain("skipping malformed queue entry"));
    }

    #[tokio::test]
    #[traced_test]
    async fn timestamp_past_year_9999_does_not_block_the_queue() {
        let s = setup();
        s.elector.grant();
        publish(&s.store, "b", "c", MAX_ID_MILLIS + 1).await;
        publish(&s.store, "b", "c", 2_000).await;

        let outcome = s.processor.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Committed {
                count: 1,
                skipped: 1,
                newest: Some(MessageId::from_millis(2_000).unwrap()),
            }
        );
        assert_eq!(s.store.queue_len().await.unwrap(), 0);
        assert!(logs_contain("skipping malformed queue entry"));
        assert_eq!(s.processor.run_cycle().await.unwrap(), CycleOutcome::Idle);
    }

    #[tokio::test]
    #[traced_test]
    async fn entry_that_cannot_be_ordered_is_skipped_alone() {
        let s = setup();
        s.elector.grant();
        publish(&s.store, "b", "c", MAX_ID_MILLIS).await;
        publish(&s.store, "b", "c", 1_000).await;
        publish(&s.store, "b", "c", 2_000).await;

        let outcome = s.processor.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Committed {
                count: 1,
                skipped: 2,
                newest: Some(MessageId::from_millis(MAX_ID_MILLIS).unwrap()),
            }
        );
        assert_eq!(s.store.queue_len().await.unwrap(), 0);
        assert!(logs_contain("skipping unorderable queue entry"));
    }

    #[tokio::test]
    async fn sticky_messages_use_the_bus_sticky_ttl() {
        let s = setup();
        s.elector.grant();
        s.clock.set(at(1_000));
        let queued = QueuedMessage::new("sticky", "c", serde_json::json!(1), at(1_000)).sticky(true);
        s.store.enqueue(queued.encode().unwrap()).await.unwrap();
        publish(&s.store, "sticky", "c", 1_000).await;
        s.processor.run_cycle().await.unwrap();

        let filter = ScanFilter::Channel("c".into());
        s.clock.set(at(1_000 + 29_000));
        assert_eq!(s.store.scan(&filter, None, 10).await.unwrap().len(), 2);
        s.clock.set(at(1_000 + 31_000));
        assert_eq!(s.store.scan(&filter, None, 10).await.unwrap().len(), 1);
        s.clock.set(at(1_000 + 3_599_000));
        assert_eq!(s.store.scan(&filter, None, 10).await.unwrap().len(), 1);
        s.clock.set(at(1_000 + 3_601_000));
        assert!(s.store.scan(&filter, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_notification_per_committed_batch() {
        let s = setup();
        s.elector.grant();
        let mut rx = s.bus.subscribe();
        publish(&s.store, "b", "c", 1_000).await;
        publish(&s.store, "b", "c", 1_000).await;
        s.processor.run_cycle().await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.count, 2);
        assert_eq!(event.newest_id, MessageId::from_millis(1_001).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn revoked_leader_abandons_the_batch() {
        let s = setup();
        publish(&s.store, "b", "c", 1_000).await;
        assert_eq!(s.processor.run_cycle().await.unwrap(), CycleOutcome::Abandoned);
        assert_eq!(s.store.queue_len().await.unwrap(), 1);
        assert!(s.store.last_assigned().await.unwrap().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn bizarre_latency_is_reported() {
        let s = setup();
        s.elector.grant();
        publish(&s.store, "b", "c", 20_000).await;
        s.processor.run_cycle().await.unwrap();
        assert!(logs_contain("time in queue is bizarre"));
    }

    #[tokio::test]
    async fn run_follows_leadership_and_stops_on_cancel() {
        let s = setup_with(ProcessorConfig {
            idle_delay_ms: 5,
            ..ProcessorConfig::default()
        });
        let mut states = s.processor.subscribe_state();
        let cancel = CancellationToken::new();
        let handle = {
            let processor = s.processor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { processor.run(cancel).await })
        };

        publish(&s.store, "b", "c", 1_000).await;
        s.elector.grant();
        states
            .wait_for(|state| *state == DrainState::Draining)
            .await
            .unwrap();
        while s.store.queue_len().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        s.elector.revoke();
        states
            .wait_for(|state| *state == DrainState::NotLeader)
            .await
            .unwrap();
        publish(&s.store, "b", "c", 2_000).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(s.store.queue_len().await.unwrap(), 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(s.processor.state(), DrainState::Stopped);
    }
}
