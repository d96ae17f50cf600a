// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Total-order assignment for newly drained messages.
//!
//! Ids are derived from the last id persisted in the GlobalIndex, never from
//! in-memory state, so a new leader picks up exactly where the previous one
//! stopped. A candidate timestamp that does not move past the last assigned
//! one is bumped to `last + 1ms`, which keeps ids unique and strictly
//! increasing across a batch even when producer clocks collide.

use chrono::{DateTime, Utc};

use crate::error::BackplaneError;
use crate::types::MessageId;

/// The most recently assigned id together with its millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAssigned {
    pub id: MessageId,
    pub millis: i64,
}

impl LastAssigned {
    /// Floor used when the store holds no messages yet.
    pub fn epoch() -> Self {
        Self {
            id: MessageId(String::new()),
            millis: 0,
        }
    }
}

/// Assigns the id for the next message given the last assigned one.
///
/// The returned value is the new `last` to chain through the rest of a batch.
pub fn next_id(
    last: &LastAssigned,
    candidate: DateTime<Utc>,
) -> Result<LastAssigned, BackplaneError> {
    let candidate_millis = candidate.timestamp_millis();
    let millis = if candidate_millis > last.millis {
        candidate_millis
    } else {
        last.millis + 1
    };
    Ok(LastAssigned {
        id: MessageId::from_millis(millis)?,
        millis,
    })
}
