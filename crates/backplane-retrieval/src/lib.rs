// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The read side of the Backplane message bus.
//!
//! [`Retriever::retrieve`] answers a consumer poll: everything newer than the
//! consumer's cursor that its [`ConsumerScope`] may see, in id order, plus
//! the cursor to present next time. Retrieval never mutates the store and
//! may run concurrently from any number of callers.

use std::sync::Arc;

use backplane_core::{BackplaneError, ConsumerScope, Message, MessageId, MessageStore};
use serde::Serialize;
use tracing::{debug, warn};

/// Default cap on messages returned by one poll.
pub const DEFAULT_MAX_MESSAGES: usize = 50;

/// One poll's worth of messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrieved {
    pub messages: Vec<Message>,
    /// Id of the last returned message, or the caller's cursor unchanged.
    pub next_cursor: String,
}

impl Retrieved {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn MessageStore>,
    max_messages: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn MessageStore>, max_messages: usize) -> Self {
        Self {
            store,
            max_messages: max_messages.max(1),
        }
    }

    /// Returns messages newer than `since` visible to `scope`.
    ///
    /// An empty `since` reads from the start. A cursor that does not parse,
    /// or names a message that no longer exists, also reads from the
    /// earliest available message. Polling again with the returned cursor
    /// and no new commits yields an empty result and the same cursor.
    ///
    /// The returned cursor is the last delivered id, or the furthest scanned
    /// id when out-of-scope entries were filtered from the page.
    pub async fn retrieve(
        &self,
        scope: &ConsumerScope,
        since: &str,
    ) -> Result<Retrieved, BackplaneError> {
        let cursor = self.resolve_cursor(since).await?;
        let scanned = self
            .store
            .scan(&scope.scan_filter(), cursor.as_ref(), self.max_messages)
            .await?;
        let furthest_scanned = scanned.iter().map(|m| m.id.clone()).max();
        let scanned_count = scanned.len();

        let messages: Vec<Message> = scanned
            .into_iter()
            .filter(|message| {
                let permitted = scope.permits(message);
                if !permitted {
                    let violation = BackplaneError::ScopeViolation {
                        id: message.id.to_string(),
                        reason: format!(
                            "bus `{}` channel `{}` outside consumer scope",
                            message.bus, message.channel
                        ),
                    };
                    warn!(error = %violation, "filtered message from index scan");
                }
                permitted
            })
            .collect();

        // Filtered entries are never deliverable, so the cursor moves past
        // them; otherwise a page made entirely of drift would be re-read forever.
        let next_cursor = if messages.len() < scanned_count {
            furthest_scanned.map(|id| id.to_string())
        } else {
            messages.last().map(|m| m.id.to_string())
        }
        .unwrap_or_else(|| since.to_string());
        debug!(count = messages.len(), next_cursor = %next_cursor, "retrieved messages");

        Ok(Retrieved {
            messages,
            next_cursor,
        })
    }

    async fn resolve_cursor(&self, since: &str) -> Result<Option<MessageId>, BackplaneError> {
        let since = since.trim();
        if since.is_empty() {
            return Ok(None);
        }
        let Ok(id) = since.parse::<MessageId>() else {
            debug!(since, "unparseable cursor, reading from earliest");
            return Ok(None);
        };
        match self.store.get(&id).await? {
            Some(_) => Ok(Some(id)),
            None => {
                debug!(since, "cursor names an unknown or expired message, reading from earliest");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("store", &self.store.name())
            .field("max_messages", &self.max_messages)
            .finish()
    }
}
