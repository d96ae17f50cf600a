// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! Every backend extends the [`PluginAdapter`] base trait and uses
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod bus_config;
pub mod leadership;
pub mod storage;

pub use adapter::PluginAdapter;
pub use bus_config::BusConfigSource;
pub use leadership::{ConnectionState, LeaderElector, LeadershipState};
pub use storage::{MessageStore, ScanFilter, StagedBatch, StagedMessage, WatchToken};
