// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message store trait and the types that flow through it.
//!
//! A store holds four structures: the inbound queue, message bodies with
//! absolute expiry, the GlobalIndex (arrival millis to `bus channel id`) with
//! its per-bus projection, and per-channel logs. Only the drain loop mutates
//! bodies and indices, and only through [`MessageStore::commit`].

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackplaneError;
use crate::order::LastAssigned;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Message, MessageId, QueueEntry};

/// GlobalIndex version captured by [`MessageStore::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchToken(pub u64);

/// A message ready to be written, with the TTL resolved for its bus.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedMessage {
    pub message: Message,
    pub ttl: Duration,
}

/// Everything one drain cycle wants to commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedBatch {
    pub messages: Vec<StagedMessage>,
    /// Queue position of the last entry consumed by this batch, malformed
    /// entries included. `None` leaves the queue untouched.
    pub dequeue_through: Option<u64>,
}

impl StagedBatch {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.dequeue_through.is_none()
    }

    /// Id of the last message in the batch, which is also the largest.
    pub fn newest_id(&self) -> Option<&MessageId> {
        self.messages.last().map(|s| &s.message.id)
    }
}

/// Which index a scan reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// Union of the BusIndex entries for each bus, merged in id order.
    Buses(BTreeSet<String>),
    /// The ChannelLog for one channel.
    Channel(String),
}

/// Persistence backend for the bus.
///
/// Implementations must make [`commit`](MessageStore::commit) all-or-nothing
/// and must hide expired bodies from [`get`](MessageStore::get) and
/// [`scan`](MessageStore::scan) without waiting for a purge.
#[async_trait]
pub trait MessageStore: PluginAdapter {
    /// Appends a raw producer record to the tail of the inbound queue and
    /// returns its queue position.
    async fn enqueue(&self, payload: Vec<u8>) -> Result<u64, BackplaneError>;

    /// Number of entries waiting on the inbound queue.
    async fn queue_len(&self) -> Result<usize, BackplaneError>;

    /// Reads up to `max` entries from the head of the queue without removing them.
    async fn peek_queue(&self, max: usize) -> Result<Vec<QueueEntry>, BackplaneError>;

    /// Captures the current GlobalIndex version.
    async fn watch(&self) -> Result<WatchToken, BackplaneError>;

    /// Reads the GlobalIndex tail. `None` for an empty store.
    async fn last_assigned(&self) -> Result<Option<LastAssigned>, BackplaneError>;

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, BackplaneError>;

    /// Live messages with id strictly greater than `since`, ascending,
    /// restricted to `filter`, at most `limit` of them.
    async fn scan(
        &self,
        filter: &ScanFilter,
        since: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, BackplaneError>;

    /// Applies `batch` atomically if the GlobalIndex version still equals
    /// `token`; otherwise returns [`BackplaneError::TransactionConflict`] and
    /// changes nothing.
    async fn commit(&self, token: WatchToken, batch: StagedBatch) -> Result<(), BackplaneError>;

    /// Removes expired bodies and their index entries, keeping the GlobalIndex
    /// tail. Returns how many messages were removed.
    async fn purge_expired(&self) -> Result<usize, BackplaneError>;

    /// Drops the backend handle and opens a fresh one.
    async fn reconnect(&self) -> Result<(), BackplaneError>;
}
