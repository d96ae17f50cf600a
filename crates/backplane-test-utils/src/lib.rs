// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Backplane integration tests.
//!
//! Provides mock collaborators and a harness for fast, deterministic tests
//! driven by a simulated clock.
//!
//! # Components
//!
//! - [`MockBusConfig`] - bus configuration with failure injection
//! - [`FlakyStore`] - store wrapper injecting conflicts, faults, and index drift
//! - [`TestHarness`] - a complete processor and retriever over one store

pub mod flaky_store;
pub mod harness;
pub mod mock_bus_config;

pub use flaky_store::FlakyStore;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_bus_config::MockBusConfig;
