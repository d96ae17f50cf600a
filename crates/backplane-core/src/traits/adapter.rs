// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait shared by every collaborator backend.

use async_trait::async_trait;

use crate::error::BackplaneError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health, and lifecycle common to stores, configuration sources,
/// and leadership backends.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Human-readable name of this adapter instance.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, BackplaneError>;

    /// Releases any held resources.
    async fn shutdown(&self) -> Result<(), BackplaneError>;
}
