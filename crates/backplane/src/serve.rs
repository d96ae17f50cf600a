// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `backplane serve` command implementation.
//!
//! Opens the configured store, takes local leadership, and runs the drain
//! loop until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use backplane_bus::NotificationBus;
use backplane_config::BackplaneConfig;
use backplane_core::{BackplaneError, Clock, LeaderElector, PluginAdapter, SystemClock};
use backplane_processor::{
    LocalElector, MessageProcessor, RetentionResolver, StaticBusConfig, recording, shutdown,
};
use tracing::{info, warn};

/// Runs the `backplane serve` command.
pub async fn run_serve(config: BackplaneConfig) -> Result<(), BackplaneError> {
    init_tracing(&config.node.log_level);
    info!(node = %config.node.name, "starting backplane serve");

    match &config.node.metrics_addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| BackplaneError::Config(format!("node.metrics_addr `{addr}`: {e}")))?;
            recording::install_prometheus(addr)?;
        }
        None => recording::register_metrics(),
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = backplane_storage::open_store(&config.storage, clock.clone()).await?;
    info!(store = store.name(), "message store opened");

    let buses = StaticBusConfig::new(&config.buses);
    info!(buses = buses.len(), "bus configuration loaded");
    let retention = RetentionResolver::new(
        Arc::new(buses),
        clock.clone(),
        config.retention.fallback_policy(),
        config.retention.cache_age(),
    );

    let elector = LocalElector::new();
    let notifications = Arc::new(NotificationBus::new());
    let processor = MessageProcessor::new(
        store.clone(),
        retention,
        elector.subscribe(),
        notifications,
        clock,
        config.processor.clone(),
    );

    let cancel = shutdown::install_signal_handler();
    elector.grant();
    let result = processor.run(cancel).await;

    elector.shutdown().await?;
    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "store shutdown failed");
    }
    info!("backplane serve stopped");
    result
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("backplane={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
