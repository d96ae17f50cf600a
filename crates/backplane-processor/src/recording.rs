// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; nothing is collected until a recorder is
//! installed, e.g. with [`install_prometheus`].

use std::net::SocketAddr;

use backplane_core::BackplaneError;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const TIME_IN_QUEUE_MS: &str = "backplane_time_in_queue_ms";
pub const MESSAGES_COMMITTED: &str = "backplane_messages_committed_total";
pub const TRANSACTION_CONFLICTS: &str = "backplane_transaction_conflicts_total";
pub const MALFORMED_ENTRIES: &str = "backplane_malformed_entries_total";
pub const STORAGE_FAULTS: &str = "backplane_storage_faults_total";

/// Register all Backplane metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_histogram!(
        TIME_IN_QUEUE_MS,
        metrics::Unit::Milliseconds,
        "Time a message spent on the inbound queue before commit"
    );
    describe_counter!(MESSAGES_COMMITTED, "Messages committed to the indices");
    describe_counter!(
        TRANSACTION_CONFLICTS,
        "Drain batches rejected by the conditional commit"
    );
    describe_counter!(MALFORMED_ENTRIES, "Queue entries discarded as undecodable");
    describe_counter!(STORAGE_FAULTS, "Drain cycles aborted by a storage fault");
}

/// Installs the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), BackplaneError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| BackplaneError::Internal(format!("failed to install Prometheus exporter: {e}")))?;
    register_metrics();
    tracing::info!(%addr, "prometheus metrics exporter listening");
    Ok(())
}

/// Installs the Prometheus recorder without a listener and returns the render handle.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BackplaneError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| BackplaneError::Internal(format!("failed to install Prometheus recorder: {e}")))?;
    register_metrics();
    Ok(handle)
}

pub fn record_time_in_queue(millis: i64) {
    metrics::histogram!(TIME_IN_QUEUE_MS).record(millis as f64);
}

pub fn record_committed(count: usize) {
    metrics::counter!(MESSAGES_COMMITTED).increment(count as u64);
}

pub fn record_conflict() {
    metrics::counter!(TRANSACTION_CONFLICTS).increment(1);
}

pub fn record_malformed() {
    metrics::counter!(MALFORMED_ENTRIES).increment(1);
}

pub fn record_storage_fault() {
    metrics::counter!(STORAGE_FAULTS).increment(1);
}
