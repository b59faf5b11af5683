// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! # kernelctl
//!
//! Operator tool for the constellation kernel.
//!
//! ## Commands
//!
//! - `kernelctl services` / `kernelctl url <service>` - Inspect the service registry
//! - `kernelctl identity [service]` / `kernelctl ping <service>` - Probe peers
//! - `kernelctl call <service> <method>` - Invoke a peer's RPC method
//! - `kernelctl serve` - Run the sys API with the built-in methods
//!
//! Configuration is read from the environment (and `.env` if present), the
//! same variables a kernel-embedding service uses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use constellation_kernel_cli::commands::{self, PeerCommand, RegistryCommand};

/// Inspect and exercise constellation services
#[derive(Parser)]
#[command(name = "kernelctl")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Service table to use instead of the built-in one
    #[arg(long, global = true, env = "KERNEL_REGISTRY_FILE", value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Registry(RegistryCommand),

    #[command(flatten)]
    Peer(PeerCommand),

    /// Serve /health, /v1/sys/identity, /v1/sys/rpc and /v1/sys/logs
    Serve {
        /// Address to bind
        #[arg(long, env = "KERNEL_HOST", default_value = "0.0.0.0")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Registry(command) => commands::registry::handle_command(command, cli.registry),
        Commands::Peer(command) => commands::peer::handle_command(command, cli.registry).await,
        Commands::Serve { host } => commands::serve::run(&host, cli.registry).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
