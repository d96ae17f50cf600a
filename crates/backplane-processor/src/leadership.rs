// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-process leadership.
//!
//! [`LocalElector`] is the coordination backend for deployments with one
//! writer process: the host grants leadership at startup and revokes it on
//! shutdown. Connection-state events follow the usual contract of a
//! distributed coordinator, so the drain loop behaves identically under
//! either backend.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use backplane_core::{
    AdapterType, BackplaneError, ConnectionState, HealthStatus, LeaderElector, LeadershipState,
    PluginAdapter,
};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

pub struct LocalElector {
    holder_id: String,
    term: AtomicU64,
    state: watch::Sender<LeadershipState>,
}

impl Default for LocalElector {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalElector {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LeadershipState::Follower);
        Self {
            holder_id: Uuid::new_v4().to_string(),
            term: AtomicU64::new(0),
            state,
        }
    }

    /// Grants leadership under a new term. Returns the term.
    pub fn grant(&self) -> u64 {
        let term = self.term.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(LeadershipState::Leader { term });
        info!(holder = %self.holder_id, term, "leadership granted");
        term
    }

    /// Revokes leadership. A no-op for a follower.
    pub fn revoke(&self) {
        let previous = self.state.send_replace(LeadershipState::Follower);
        if previous.is_leader() {
            info!(holder = %self.holder_id, "leadership revoked");
        }
    }

    /// Applies a coordinator connection event.
    ///
    /// Suspension or loss drops leadership immediately. A reconnect leaves
    /// the node a follower until it is granted again.
    pub fn connection_changed(&self, connection: ConnectionState) {
        match connection {
            ConnectionState::Connected => {}
            ConnectionState::Suspended => {
                warn!(holder = %self.holder_id, "coordinator connection suspended");
                self.state.send_replace(LeadershipState::Suspended);
            }
            ConnectionState::Lost => {
                warn!(holder = %self.holder_id, "coordinator connection lost");
                self.state.send_replace(LeadershipState::Follower);
            }
            ConnectionState::Reconnected => {
                info!(holder = %self.holder_id, "coordinator connection restored");
                self.state.send_if_modified(|state| {
                    if *state == LeadershipState::Suspended {
                        *state = LeadershipState::Follower;
                        true
                    } else {
                        false
                    }
                });
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for LocalElector {
    fn name(&self) -> &str {
        "local-elector"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Leadership
    }

    async fn health_check(&self) -> Result<HealthStatus, BackplaneError> {
        Ok(match self.state() {
            LeadershipState::Suspended => HealthStatus::Degraded("connection suspended".into()),
            _ => HealthStatus::Healthy,
        })
    }

    async fn shutdown(&self) -> Result<(), BackplaneError> {
        self.revoke();
        Ok(())
    }
}

impl LeaderElector for LocalElector {
    fn subscribe(&self) -> watch::Receiver<LeadershipState> {
        self.state.subscribe()
    }
}
