// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backplane - a totally ordered, retention-bounded pub/sub message bus.
//!
//! This is the binary entry point: `serve` runs the drain loop, `publish`
//! and `poll` talk to the same store from the command line.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod client;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Backplane - a totally ordered pub/sub message bus.
#[derive(Parser, Debug)]
#[command(name = "backplane", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Drain the inbound queue into the ordered indices until interrupted.
    Serve,
    /// Enqueue one message.
    Publish(client::PublishArgs),
    /// Print messages newer than a cursor as JSON.
    Poll(client::PollArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => backplane_config::load_and_validate_path(path),
        None => backplane_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            backplane_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Publish(args) => client::run_publish(config, args).await,
        Commands::Poll(args) => client::run_poll(config, args).await,
    };

    if let Err(e) = result {
        eprintln!("backplane: {e}");
        std::process::exit(1);
    }
}
