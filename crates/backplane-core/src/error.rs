// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Backplane message bus.

use thiserror::Error;

/// The primary error type used across the store, processor, and retrieval paths.
#[derive(Debug, Error)]
pub enum BackplaneError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A conditional commit was rejected because the watched GlobalIndex
    /// version moved since the watch was taken.
    #[error("transaction conflict: watched version {expected}, found {found}")]
    TransactionConflict { expected: u64, found: u64 },

    /// A queued entry could not be decoded into a message.
    #[error("malformed queue entry: {reason}")]
    MalformedEntry { reason: String },

    /// Connection-level fault talking to the persistence backend.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Retention policy lookup for a bus failed.
    #[error("retention policy lookup failed for bus `{bus}`: {source}")]
    ConfigLookup {
        bus: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A message surfaced that the consumer scope must not see.
    #[error("scope violation for message {id}: {reason}")]
    ScopeViolation { id: String, reason: String },

    /// A string could not be interpreted as a message id.
    #[error("invalid message id `{0}`")]
    InvalidMessageId(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackplaneError {
    /// Wraps any backend error as a storage fault.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::StorageUnavailable {
            source: source.into(),
        }
    }

    /// Whether the drain loop should back off and retry rather than give up.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. } | Self::StorageUnavailable { .. })
    }
}

impl From<serde_json::Error> for BackplaneError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedEntry {
            reason: e.to_string(),
        }
    }
}
