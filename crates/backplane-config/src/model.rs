// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Backplane message bus.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use backplane_core::RetentionPolicy;
use backplane_core::types::{DEFAULT_STICKY_TTL_SECONDS, DEFAULT_TTL_SECONDS};
use serde::{Deserialize, Serialize};

/// Top-level Backplane configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackplaneConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Drain loop tuning.
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Fallback retention and policy caching.
    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Static per-bus configuration, one `[[buses]]` table per bus.
    #[serde(default)]
    pub buses: Vec<BusConfig>,
}

/// Node identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Address for the Prometheus scrape listener. Metrics are not exported when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            log_level: default_log_level(),
            metrics_addr: None,
        }
    }
}

fn default_node_name() -> String {
    "backplane".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which message store implementation to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("backplane").join("backplane.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("backplane.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Drain loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Maximum queue entries read per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep when the inbound queue is empty.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,

    /// Sleep after a rejected commit.
    #[serde(default = "default_backoff_ms")]
    pub conflict_backoff_ms: u64,

    /// Sleep after a storage fault, before reconnecting.
    #[serde(default = "default_backoff_ms")]
    pub fault_backoff_ms: u64,

    /// Interval between expired-entry purges while leader.
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            idle_delay_ms: default_idle_delay_ms(),
            conflict_backoff_ms: default_backoff_ms(),
            fault_backoff_ms: default_backoff_ms(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

impl ProcessorConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes * 60)
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_idle_delay_ms() -> u64 {
    250
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_cleanup_interval_minutes() -> u64 {
    2
}

/// Fallback TTLs and retention policy caching.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    #[serde(default = "default_sticky_ttl_seconds")]
    pub sticky_ttl_seconds: u64,

    /// How long a bus's resolved policy is reused before asking again.
    #[serde(default = "default_config_cache_age_seconds")]
    pub config_cache_age_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl_seconds(),
            sticky_ttl_seconds: default_sticky_ttl_seconds(),
            config_cache_age_seconds: default_config_cache_age_seconds(),
        }
    }
}

impl RetentionConfig {
    /// The policy applied to buses with no configuration of their own.
    pub fn fallback_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            default_ttl_seconds: self.default_ttl_seconds,
            sticky_ttl_seconds: self.sticky_ttl_seconds,
        }
    }

    pub fn cache_age(&self) -> Duration {
        Duration::from_secs(self.config_cache_age_seconds)
    }
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_sticky_ttl_seconds() -> u64 {
    DEFAULT_STICKY_TTL_SECONDS
}

fn default_config_cache_age_seconds() -> u64 {
    10
}

/// Consumer read path configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Upper bound on messages returned by one retrieve call.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_messages() -> usize {
    50
}

/// A statically configured bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    pub name: String,

    #[serde(default = "default_ttl_seconds")]
    pub retention_time_seconds: u64,

    #[serde(default = "default_sticky_ttl_seconds")]
    pub retention_time_sticky_seconds: u64,
}

impl BusConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            default_ttl_seconds: self.retention_time_seconds,
            sticky_ttl_seconds: self.retention_time_sticky_seconds,
        }
    }
}
