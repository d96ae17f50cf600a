// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus configuration collaborator.

use async_trait::async_trait;

use crate::error::BackplaneError;
use crate::traits::adapter::PluginAdapter;
use crate::types::RetentionPolicy;

/// Source of per-bus retention policies.
#[async_trait]
pub trait BusConfigSource: PluginAdapter {
    /// Returns the bus's policy, or `None` when the bus has none configured.
    async fn retention_policy(&self, bus: &str) -> Result<Option<RetentionPolicy>, BackplaneError>;
}
