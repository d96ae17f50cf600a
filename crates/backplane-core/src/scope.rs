// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer authorization scopes.
//!
//! The authorization collaborator resolves a presented credential into a
//! [`ConsumerScope`]; everything downstream asks the scope a single question
//! through [`ConsumerScope::permits`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::traits::storage::ScanFilter;
use crate::types::Message;

/// What a consumer is allowed to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsumerScope {
    /// Sees every channel on the listed buses.
    Privileged { allowed_buses: BTreeSet<String> },
    /// Sees exactly one channel.
    ChannelBound { channel: String },
}

impl ConsumerScope {
    pub fn privileged<I, S>(buses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Privileged {
            allowed_buses: buses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn channel(channel: impl Into<String>) -> Self {
        Self::ChannelBound {
            channel: channel.into(),
        }
    }

    /// Whether a message may be shown to this consumer.
    pub fn permits(&self, message: &Message) -> bool {
        match self {
            Self::Privileged { allowed_buses } => allowed_buses.contains(&message.bus),
            Self::ChannelBound { channel } => *channel == message.channel,
        }
    }

    /// The index a scan for this scope should read.
    pub fn scan_filter(&self) -> ScanFilter {
        match self {
            Self::Privileged { allowed_buses } => ScanFilter::Buses(allowed_buses.clone()),
            Self::ChannelBound { channel } => ScanFilter::Channel(channel.clone()),
        }
    }
}
