// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Commit notifications.
//!
//! The drain loop publishes one [`MessageCommitted`] per successful batch.
//! Blocking-read implementations in a transport layer subscribe and re-run
//! their retrieval when an event newer than their cursor arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backplane_core::MessageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// Published once per committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCommitted {
    pub event_id: Uuid,
    /// Largest id in the batch.
    pub newest_id: MessageId,
    /// Number of messages the batch persisted.
    pub count: usize,
    pub committed_at: DateTime<Utc>,
}

impl MessageCommitted {
    pub fn new(newest_id: MessageId, count: usize, committed_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            newest_id,
            count,
            committed_at,
        }
    }
}

/// In-process broadcast of commit events.
#[derive(Debug)]
pub struct NotificationBus {
    sender: broadcast::Sender<MessageCommitted>,
    published: AtomicU64,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Publishes an event. Returns how many subscribers were listening.
    pub fn publish(&self, event: MessageCommitted) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(receivers, "commit notification published");
                receivers
            }
            // No subscribers is normal when nobody is long-polling.
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageCommitted> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Waits until a commit newer than `cursor` is announced, or `timeout` passes.
    ///
    /// Returns the newest announced id, or `None` on timeout. A lagged
    /// receiver counts as "something happened": the caller re-reads anyway.
    pub async fn wait_past(&self, cursor: Option<&MessageId>, timeout: Duration) -> Option<MessageId> {
        let mut rx = self.subscribe();
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) if cursor.is_none_or(|c| event.newest_id > *c) => {
                        return Some(event.newest_id);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "notification receiver lagged");
                        return cursor.cloned();
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}
