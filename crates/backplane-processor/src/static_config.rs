// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus configuration read from the `[[buses]]` config array.

use std::collections::HashMap;

use async_trait::async_trait;
use backplane_config::BusConfig;
use backplane_core::{
    AdapterType, BackplaneError, BusConfigSource, HealthStatus, PluginAdapter, RetentionPolicy,
};

/// A fixed bus configuration table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticBusConfig {
    buses: HashMap<String, RetentionPolicy>,
}

impl StaticBusConfig {
    pub fn new(buses: &[BusConfig]) -> Self {
        Self {
            buses: buses
                .iter()
                .map(|bus| (bus.name.clone(), bus.retention_policy()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for StaticBusConfig {
    fn name(&self) -> &str {
        "static-bus-config"
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
impl BusConfigSource for StaticBusConfig {
    async fn retention_policy(&self, bus: &str) -> Result<Option<RetentionPolicy>, BackplaneError> {
        Ok(self.buses.get(bus).copied())
    }
}
