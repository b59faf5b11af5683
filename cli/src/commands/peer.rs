// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Peer commands
//!
//! Commands: identity, ping, call

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use constellation_kernel::domain::identity::KernelIdentity;
use constellation_kernel::infrastructure::rpc_client::RpcError;

use super::client_kernel;

#[derive(Subcommand)]
pub enum PeerCommand {
    /// Show the identity of a peer, or of this process when omitted
    Identity {
        /// Service name
        service: Option<String>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a peer's health endpoint answers
    Ping {
        /// Service name
        service: String,
    },

    /// Invoke an RPC method on a peer
    Call {
        /// Service name
        service: String,

        /// Method name (e.g. sys.ping)
        method: String,

        /// JSON params
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Deadline in milliseconds (default: KERNEL_RPC_TIMEOUT_MS)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

pub async fn handle_command(command: PeerCommand, registry_file: Option<PathBuf>) -> Result<()> {
    let kernel = client_kernel(registry_file)?;
    match command {
        PeerCommand::Identity { service, json } => {
            let identity = match service {
                Some(service) => kernel
                    .rpc
                    .get_identity(&service)
                    .await
                    .with_context(|| format!("Failed to fetch identity of {service}"))?,
                None => kernel.identity.get_identity(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&identity)?);
            } else {
                print_identity(&identity);
            }
            Ok(())
        }
        PeerCommand::Ping { service } => {
            if kernel.rpc.ping(&service).await {
                println!("{} {} is reachable", "✓".green(), service);
                Ok(())
            } else {
                bail!("{service} did not answer its health check");
            }
        }
        PeerCommand::Call {
            service,
            method,
            params,
            timeout_ms,
        } => {
            let params: Value = serde_json::from_str(&params).context("--params must be valid JSON")?;
            let timeout = timeout_ms.map(Duration::from_millis);
            match kernel.rpc.call::<Value, _>(&service, &method, params, timeout).await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    Ok(())
                }
                Err(RpcError::Remote { code, message, details, .. }) => {
                    eprintln!("{} [{}] {}", "✗".red(), code.red(), message);
                    if let Some(details) = details {
                        eprintln!("{}", serde_json::to_string_pretty(&details)?.dimmed());
                    }
                    bail!("{service}.{method} returned an error");
                }
                Err(e) => Err(e).with_context(|| format!("Call to {service}.{method} failed")),
            }
        }
    }
}

fn print_identity(identity: &KernelIdentity) {
    println!("{} {}", identity.name.bold(), format!("v{}", identity.version).dimmed());
    println!("  Role:         {}", identity.role);
    println!("  Environment:  {}", identity.environment);
    println!("  Health:       {}", identity.health);
    println!("  External URL: {}", identity.urls.external);
    println!("  Peer URL:     {}", identity.urls.peer);
    println!("  Internal URL: {}", identity.urls.internal);
    println!(
        "  Runtime:      {} pid {} port {} (up {}s)",
        identity.runtime.hostname,
        identity.runtime.pid,
        identity.runtime.port,
        identity.runtime.uptime_seconds
    );
    println!("  Capabilities: {}", identity.capabilities.join(", "));
}
