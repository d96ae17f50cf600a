// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{BackplaneConfig, StorageBackend};

const MAX_BATCH_SIZE: usize = 1000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BackplaneConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        fail("storage.database_path must not be empty".to_string());
    }

    if let Some(addr) = &config.node.metrics_addr
        && addr.parse::<std::net::SocketAddr>().is_err()
    {
        fail(format!("node.metrics_addr `{addr}` is not a valid socket address"));
    }

    let batch = config.processor.batch_size;
    if !(1..=MAX_BATCH_SIZE).contains(&batch) {
        fail(format!(
            "processor.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {batch}"
        ));
    }

    if config.retention.default_ttl_seconds == 0 {
        fail("retention.default_ttl_seconds must be greater than 0".to_string());
    }
    if config.retention.sticky_ttl_seconds == 0 {
        fail("retention.sticky_ttl_seconds must be greater than 0".to_string());
    }

    if config.retrieval.max_messages == 0 {
        fail("retrieval.max_messages must be at least 1".to_string());
    }

    let mut seen = HashSet::new();
    for (i, bus) in config.buses.iter().enumerate() {
        if bus.name.trim().is_empty() {
            fail(format!("buses[{i}].name must not be empty"));
            continue;
        }
        if !seen.insert(bus.name.as_str()) {
            fail(format!("duplicate bus name `{}` in [[buses]] array", bus.name));
        }
        if bus.retention_time_seconds == 0 {
            fail(format!(
                "buses[{i}].retention_time_seconds must be greater than 0"
            ));
        }
        if bus.retention_time_sticky_seconds == 0 {
            fail(format!(
                "buses[{i}].retention_time_sticky_seconds must be greater than 0"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
