// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The write side of the Backplane message bus.
//!
//! [`MessageProcessor`] drains the inbound queue into the ordered indices
//! while this node holds leadership. Retention policies come from a
//! [`BusConfigSource`](backplane_core::BusConfigSource) through a caching
//! [`RetentionResolver`]; leadership comes from any
//! [`LeaderElector`](backplane_core::LeaderElector), with [`LocalElector`]
//! covering single-process deployments.

pub mod leadership;
pub mod processor;
pub mod recording;
pub mod retention;
pub mod shutdown;
pub mod static_config;

pub use leadership::LocalElector;
pub use processor::{CycleOutcome, DrainState, MessageProcessor};
pub use retention::RetentionResolver;
pub use shutdown::install_signal_handler;
pub use static_config::StaticBusConfig;
