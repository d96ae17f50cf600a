// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock bus configuration source for deterministic testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use backplane_core::{
    AdapterType, BackplaneError, BusConfigSource, HealthStatus, PluginAdapter, RetentionPolicy,
};

/// A bus configuration table that can be edited and made to fail mid-test.
#[derive(Default)]
pub struct MockBusConfig {
    policies: Mutex<HashMap<String, RetentionPolicy>>,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl MockBusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for a bus.
    pub async fn set(&self, bus: &str, default_ttl_seconds: u64, sticky_ttl_seconds: u64) {
        self.policies.lock().await.insert(
            bus.to_string(),
            RetentionPolicy {
                default_ttl_seconds,
                sticky_ttl_seconds,
            },
        );
    }

    pub async fn remove(&self, bus: &str) {
        self.policies.lock().await.remove(bus);
    }

    /// While set, every lookup fails with `ConfigLookup`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of lookups served, failed ones included.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for MockBusConfig {
    fn name(&self) -> &str {
        "mock-bus-config"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::BusConfig
    }

    async fn health_check(&self) -> Result<HealthStatus, BackplaneError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BackplaneError> {
        Ok(())
    }
}

#[async_trait]
impl BusConfigSource for MockBusConfig {
    async fn retention_policy(&self, bus: &str) -> Result<Option<RetentionPolicy>, BackplaneError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackplaneError::ConfigLookup {
                bus: bus.to_string(),
                source: "mock bus config unavailable".into(),
            });
        }
        Ok(self.policies.lock().await.get(bus).copied())
    }
}
