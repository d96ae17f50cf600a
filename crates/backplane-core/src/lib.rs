// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Backplane message bus.
//!
//! This crate provides the domain types, the error taxonomy, the total-order
//! assigner, consumer scopes, and the collaborator traits that the storage,
//! processor, and retrieval crates build on.

pub mod clock;
pub mod error;
pub mod order;
pub mod scope;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::BackplaneError;
pub use order::{LastAssigned, next_id};
pub use scope::ConsumerScope;
pub use types::{
    AdapterType, HealthStatus, MAX_ID_MILLIS, MIN_ID_MILLIS, Message, MessageId, QueueEntry,
    QueuedMessage, RetentionPolicy,
};

pub use traits::{
    BusConfigSource, ConnectionState, LeaderElector, LeadershipState, MessageStore,
    PluginAdapter, ScanFilter, StagedBatch, StagedMessage, WatchToken,
};
