// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `backplane publish` and `backplane poll`.
//!
//! Both open the configured store directly; against SQLite they can run
//! alongside a `backplane serve` process on the same database.

use std::sync::Arc;

use backplane_config::{BackplaneConfig, StorageBackend};
use backplane_core::{
    BackplaneError, Clock, ConsumerScope, MessageStore, QueuedMessage, SystemClock,
};
use backplane_retrieval::Retriever;
use clap::Args;
use tracing::warn;

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[arg(long)]
    pub bus: String,

    #[arg(long)]
    pub channel: String,

    /// Retain with the bus's sticky TTL.
    #[arg(long)]
    pub sticky: bool,

    /// Message payload as JSON.
    #[arg(long, default_value = "null")]
    pub payload: String,
}

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Read as a privileged consumer of these buses.
    #[arg(long, conflicts_with = "channel", required_unless_present = "channel")]
    pub bus: Vec<String>,

    /// Read as a consumer bound to one channel.
    #[arg(long)]
    pub channel: Option<String>,

    /// Cursor returned by the previous poll.
    #[arg(long, default_value = "")]
    pub since: String,
}

impl PollArgs {
    pub fn scope(&self) -> ConsumerScope {
        match &self.channel {
            Some(channel) => ConsumerScope::channel(channel.clone()),
            None => ConsumerScope::privileged(self.bus.iter().cloned()),
        }
    }
}

pub async fn run_publish(config: BackplaneConfig, args: PublishArgs) -> Result<(), BackplaneError> {
    crate::serve::init_tracing("warn");
    let payload: serde_json::Value = serde_json::from_str(&args.payload)?;
    let clock = SystemClock;

    let store = open(&config, Arc::new(clock)).await?;
    let queued = QueuedMessage::new(args.bus, args.channel, payload, clock.now()).sticky(args.sticky);
    let position = store.enqueue(queued.encode()?).await?;
    store.shutdown().await?;

    println!("{}", serde_json::json!({ "position": position }));
    Ok(())
}

pub async fn run_poll(config: BackplaneConfig, args: PollArgs) -> Result<(), BackplaneError> {
    crate::serve::init_tracing("warn");
    let store = open(&config, Arc::new(SystemClock)).await?;
    let retriever = Retriever::new(store.clone(), config.retrieval.max_messages);

    let retrieved = retriever.retrieve(&args.scope(), &args.since).await?;
    store.shutdown().await?;

    let rendered = serde_json::to_string_pretty(&retrieved)
        .map_err(|e| BackplaneError::Internal(format!("failed to render messages: {e}")))?;
    println!("{rendered}");
    Ok(())
}

async fn open(
    config: &BackplaneConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn MessageStore>, BackplaneError> {
    if config.storage.backend == StorageBackend::Memory {
        warn!("memory backend is process-local; nothing is shared with a running server");
    }
    backplane_storage::open_store(&config.storage, clock).await
}
