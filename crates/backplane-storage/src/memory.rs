// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process message store.
//!
//! Every structure lives behind one mutex, so a commit is trivially atomic:
//! the version check and all writes happen under the same guard.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use backplane_core::{
    AdapterType, BackplaneError, Clock, HealthStatus, LastAssigned, Message, MessageId,
    MessageStore, PluginAdapter, QueueEntry, ScanFilter, StagedBatch, WatchToken,
};

struct StoredMessage {
    message: Message,
    expires_at: i64,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<QueueEntry>,
    next_position: u64,
    bodies: HashMap<MessageId, StoredMessage>,
    /// arrival millis -> `"bus channel id"`, plus the id for lookups.
    global: BTreeMap<i64, (String, MessageId)>,
    buses: HashMap<String, BTreeMap<i64, MessageId>>,
    channels: HashMap<String, Vec<MessageId>>,
    version: u64,
}

impl Inner {
    fn live(&self, id: &MessageId, now_ms: i64) -> Option<&Message> {
        self.bodies
            .get(id)
            .filter(|stored| stored.expires_at > now_ms)
            .map(|stored| &stored.message)
    }
}

/// Mutex-guarded store for tests, demos, and single-process deployments.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner {
                next_position: 1,
                ..Inner::default()
            }),
        }
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BackplaneError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BackplaneError> {
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<u64, BackplaneError> {
        let mut inner = self.inner.lock().await;
        let position = inner.next_position;
        inner.next_position += 1;
        inner.queue.push_back(QueueEntry { position, payload });
        Ok(position)
    }

    async fn queue_len(&self) -> Result<usize, BackplaneError> {
        Ok(self.inner.lock().await.queue.len())
    }

    async fn peek_queue(&self, max: usize) -> Result<Vec<QueueEntry>, BackplaneError> {
        Ok(self.inner.lock().await.queue.iter().take(max).cloned().collect())
    }

    async fn watch(&self) -> Result<WatchToken, BackplaneError> {
        Ok(WatchToken(self.inner.lock().await.version))
    }

    async fn last_assigned(&self) -> Result<Option<LastAssigned>, BackplaneError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .global
            .last_key_value()
            .map(|(millis, (_, id))| LastAssigned {
                id: id.clone(),
                millis: *millis,
            }))
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, BackplaneError> {
        let now = self.clock.now_millis();
        Ok(self.inner.lock().await.live(id, now).cloned())
    }

    async fn scan(
        &self,
        filter: &ScanFilter,
        since: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, BackplaneError> {
        let now = self.clock.now_millis();
        let inner = self.inner.lock().await;
        let newer = |id: &&MessageId| since.is_none_or(|s| *id > s);

        let ids: Vec<&MessageId> = match filter {
            ScanFilter::Buses(buses) => {
                let mut ids: Vec<&MessageId> = buses
                    .iter()
                    .filter_map(|bus| inner.buses.get(bus))
                    .flat_map(|index| index.values())
                    .filter(newer)
                    .collect();
                ids.sort();
                ids
            }
            ScanFilter::Channel(channel) => inner
                .channels
                .get(channel)
                .map(|log| log.iter().filter(newer).collect())
                .unwrap_or_default(),
        };

        Ok(ids
            .into_iter()
            .filter_map(|id| inner.live(id, now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn commit(&self, token: WatchToken, batch: StagedBatch) -> Result<(), BackplaneError> {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().await;

        if inner.version != token.0 {
            return Err(BackplaneError::TransactionConflict {
                expected: token.0,
                found: inner.version,
            });
        }

        // Validate before touching anything so a bad id cannot leave a partial write.
        let keyed = batch
            .messages
            .into_iter()
            .map(|staged| Ok((staged.message.id.millis()?, staged)))
            .collect::<Result<Vec<_>, BackplaneError>>()?;

        let wrote = !keyed.is_empty();
        for (millis, staged) in keyed {
            let m = staged.message;
            let ttl_ms = i64::try_from(staged.ttl.as_millis()).unwrap_or(i64::MAX);
            let entry = format!("{} {} {}", m.bus, m.channel, m.id);

            inner.global.insert(millis, (entry, m.id.clone()));
            inner
                .buses
                .entry(m.bus.clone())
                .or_default()
                .insert(millis, m.id.clone());
            inner
                .channels
                .entry(m.channel.clone())
                .or_default()
                .push(m.id.clone());
            inner.bodies.insert(
                m.id.clone(),
                StoredMessage {
                    message: m,
                    expires_at: now.saturating_add(ttl_ms),
                },
            );
        }
        if wrote {
            inner.version += 1;
        }

        if let Some(through) = batch.dequeue_through {
            while inner.queue.front().is_some_and(|e| e.position <= through) {
                inner.queue.pop_front();
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, BackplaneError> {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().await;

        let expired: Vec<MessageId> = inner
            .bodies
            .iter()
            .filter(|(_, stored)| stored.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(stored) = inner.bodies.remove(id) {
                let m = stored.message;
                if let Some(index) = inner.buses.get_mut(&m.bus) {
                    index.retain(|_, v| v != id);
                }
                if let Some(log) = inner.channels.get_mut(&m.channel) {
                    log.retain(|v| v != id);
                }
            }
        }

        let tail = inner.global.last_key_value().map(|(k, _)| *k);
        let Inner { global, bodies, .. } = &mut *inner;
        let before = global.len();
        global.retain(|k, (_, id)| Some(*k) == tail || bodies.contains_key(id));
        let orphans = before - global.len();

        if !expired.is_empty() || orphans > 0 {
            inner.version += 1;
            debug!(removed = expired.len(), "purged expired messages");
        }
        Ok(expired.len())
    }

    async fn reconnect(&self) -> Result<(), BackplaneError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backplane_core::{ManualClock, StagedMessage};
    use std::time::Duration;

    fn staged(millis: i64, bus: &str, channel: &str) -> StagedMessage {
        StagedMessage {
            message: Message {
                id: MessageId::from_millis(millis).unwrap(),
                bus: bus.into(),
                channel: channel.into(),
                sticky: false,
                payload: serde_json::Value::Null,
            },
            ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn conflict_leaves_everything_untouched() {
        let store = MemoryStore::new(Arc::new(ManualClock::at_millis(0)));
        store.enqueue(b"x".to_vec()).await.unwrap();
        let stale = store.watch().await.unwrap();

        let fresh = store.watch().await.unwrap();
        store
            .commit(
                fresh,
                StagedBatch {
                    messages: vec![staged(5, "b", "c")],
                    dequeue_through: None,
                },
            )
            .await
            .unwrap();

        let err = store
            .commit(
                stale,
                StagedBatch {
                    messages: vec![staged(6, "b", "c")],
                    dequeue_through: Some(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackplaneError::TransactionConflict {
                expected: 0,
                found: 1
            }
        ));
        assert_eq!(store.queue_len().await.unwrap(), 1);
        assert!(
            store
                .get(&MessageId::from_millis(6).unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn dequeue_through_removes_only_the_consumed_prefix() {
        let store = MemoryStore::new(Arc::new(ManualClock::at_millis(0)));
        for i in 0..4u8 {
            store.enqueue(vec![i]).await.unwrap();
        }
        let token = store.watch().await.unwrap();
        store
            .commit(
                token,
                StagedBatch {
                    messages: Vec::new(),
                    dequeue_through: Some(2),
                },
            )
            .await
            .unwrap();

        let rest = store.peek_queue(10).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].position, 3);
        assert_eq!(store.watch().await.unwrap(), token, "no index change, no bump");
    }
}
