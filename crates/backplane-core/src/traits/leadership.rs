// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadership contract consumed by the drain loop.
//!
//! The coordination backend is free to be anything that guarantees at most
//! one holder and announces revocation; the drain loop only ever looks at the
//! latest [`LeadershipState`] on a watch channel.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::traits::adapter::PluginAdapter;

/// Where this node stands in the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadershipState {
    Follower,
    /// Holding leadership for the given term.
    Leader { term: u64 },
    /// Connection to the coordination service is suspended; not leader.
    Suspended,
}

impl LeadershipState {
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader { .. })
    }
}

/// Connection events from the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Suspended,
    Reconnected,
    Lost,
}

/// Delivers leadership changes to the drain loop.
pub trait LeaderElector: PluginAdapter {
    fn subscribe(&self) -> watch::Receiver<LeadershipState>;

    fn state(&self) -> LeadershipState {
        *self.subscribe().borrow()
    }
}
