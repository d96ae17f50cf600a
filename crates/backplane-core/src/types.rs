// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the store, processor, and retrieval crates.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::BackplaneError;

/// chrono format for message ids: millisecond ISO-8601 with a trailing `Z`.
///
/// Every id has the same width, so string order equals chronological order.
pub const MESSAGE_ID_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Earliest representable id time, `0000-01-01T00:00:00.000Z`.
pub const MIN_ID_MILLIS: i64 = -62_167_219_200_000;

/// Latest representable id time, `9999-12-31T23:59:59.999Z`.
///
/// Years past 9999 render with a sign and a fifth digit, which breaks both
/// the fixed width and RFC 3339 parsing.
pub const MAX_ID_MILLIS: i64 = 253_402_300_799_999;

/// Fallback TTL for ordinary messages when a bus has no retention policy.
pub const DEFAULT_TTL_SECONDS: u64 = 60;

/// Fallback TTL for sticky messages when a bus has no retention policy.
pub const DEFAULT_STICKY_TTL_SECONDS: u64 = 3600;

/// Globally unique, lexically sortable message identifier.
///
/// The id is the message's assigned arrival time rendered with
/// [`MESSAGE_ID_FORMAT`]; comparing two ids compares their arrival times.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Renders a millisecond timestamp as an id.
    pub fn from_millis(millis: i64) -> Result<Self, BackplaneError> {
        let out_of_range = || BackplaneError::InvalidMessageId(format!("{millis}ms out of range"));
        if !(MIN_ID_MILLIS..=MAX_ID_MILLIS).contains(&millis) {
            return Err(out_of_range());
        }
        let ts = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(out_of_range)?;
        Ok(Self::from_timestamp(ts))
    }

    /// Renders a timestamp as an id, truncating below millisecond precision.
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Self(ts.format(MESSAGE_ID_FORMAT).to_string())
    }

    /// Parses the arrival time embedded in the id.
    ///
    /// Anything after the `Z` marker is ignored, so ids carrying a suffix
    /// still resolve to their timestamp.
    pub fn timestamp(&self) -> Result<DateTime<Utc>, BackplaneError> {
        let end = self
            .0
            .find('Z')
            .ok_or_else(|| BackplaneError::InvalidMessageId(self.0.clone()))?;
        DateTime::parse_from_rfc3339(&self.0[..=end])
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| BackplaneError::InvalidMessageId(self.0.clone()))
    }

    /// Arrival time in milliseconds since the Unix epoch.
    pub fn millis(&self) -> Result<i64, BackplaneError> {
        Ok(self.timestamp()?.timestamp_millis())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = BackplaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_string());
        id.timestamp()?;
        Ok(id)
    }
}

/// A persisted message. Immutable once the drain loop has committed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub bus: String,
    pub channel: String,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A producer-submitted message waiting on the inbound queue.
///
/// This is the wire record stored in queue entries; it has no stable id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub bus: String,
    pub channel: String,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub producer_timestamp: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(
        bus: impl Into<String>,
        channel: impl Into<String>,
        payload: serde_json::Value,
        producer_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            bus: bus.into(),
            channel: channel.into(),
            sticky: false,
            payload,
            producer_timestamp,
        }
    }

    pub fn sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    /// Serializes the record for the inbound queue.
    pub fn encode(&self) -> Result<Vec<u8>, BackplaneError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a queue entry, rejecting records without a bus or channel and
    /// producer timestamps outside the range an id can represent.
    pub fn decode(bytes: &[u8]) -> Result<Self, BackplaneError> {
        let queued: Self = serde_json::from_slice(bytes)?;
        let stamp = queued.producer_timestamp.timestamp_millis();
        if !(MIN_ID_MILLIS..=MAX_ID_MILLIS).contains(&stamp) {
            return Err(BackplaneError::MalformedEntry {
                reason: format!("producer timestamp {} out of range", queued.producer_timestamp),
            });
        }
        if queued.bus.trim().is_empty() {
            return Err(BackplaneError::MalformedEntry {
                reason: "missing bus".into(),
            });
        }
        if queued.channel.trim().is_empty() {
            return Err(BackplaneError::MalformedEntry {
                reason: "missing channel".into(),
            });
        }
        Ok(queued)
    }

    /// Attaches the assigned id, producing the persisted form.
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            bus: self.bus,
            channel: self.channel,
            sticky: self.sticky,
            payload: self.payload,
        }
    }
}

/// A raw inbound queue entry as read from the head of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Monotonically increasing position assigned at enqueue time.
    pub position: u64,
    pub payload: Vec<u8>,
}

/// Per-bus retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub default_ttl_seconds: u64,
    pub sticky_ttl_seconds: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            sticky_ttl_seconds: DEFAULT_STICKY_TTL_SECONDS,
        }
    }
}

impl RetentionPolicy {
    /// TTL applied to a message of the given class.
    pub fn ttl_for(&self, sticky: bool) -> Duration {
        if sticky {
            Duration::from_secs(self.sticky_ttl_seconds)
        } else {
            Duration::from_secs(self.default_ttl_seconds)
        }
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    BusConfig,
    Leadership,
}
