// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Registry commands
//!
//! Commands: services, url

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use constellation_kernel::domain::service::{Environment, UrlType};
use constellation_kernel::infrastructure::registry::ServiceRegistry;

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// List every registered service
    Services {
        /// Environment whose URLs to show
        #[arg(long, env = "ENVIRONMENT", default_value = "development")]
        env: Environment,

        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve one URL of a service
    Url {
        /// Service name (e.g. core, api, web)
        service: String,

        /// Environment to resolve for
        #[arg(long, env = "ENVIRONMENT", default_value = "development")]
        env: Environment,

        /// external, peer, internal or proxy; omit for the public URL
        #[arg(long = "type", value_name = "TYPE")]
        url_type: Option<UrlType>,
    },
}

pub fn handle_command(command: RegistryCommand, registry_file: Option<PathBuf>) -> Result<()> {
    let registry = load_registry(registry_file)?;
    match command {
        RegistryCommand::Services { env, json } => services(&registry, env, json),
        RegistryCommand::Url {
            service,
            env,
            url_type,
        } => url(&registry, &service, env, url_type),
    }
}

pub fn load_registry(path: Option<PathBuf>) -> Result<ServiceRegistry> {
    match path {
        Some(path) => ServiceRegistry::from_yaml_file(&path)
            .with_context(|| format!("Failed to load service table from {}", path.display())),
        None => Ok(ServiceRegistry::builtin()),
    }
}

fn services(registry: &ServiceRegistry, env: Environment, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(registry.services())?);
        return Ok(());
    }

    println!("{} ({})", "Registered services:".bold(), env);
    println!();
    for service in registry.services() {
        let urls = service.urls.for_env(env);
        println!("  {} [{}] :{}", service.name.bold(), service.role, service.port);
        println!("    External: {}", urls.external);
        println!("    Peer:     {}", urls.peer);
        println!("    Internal: {}", urls.internal);
        if let Some(proxy) = &urls.proxy {
            println!("    Proxy:    {}", proxy);
        }
        println!("    Health:   {}", service.health_check_path.dimmed());
    }

    Ok(())
}

fn url(registry: &ServiceRegistry, service: &str, env: Environment, url_type: Option<UrlType>) -> Result<()> {
    let resolved = match url_type {
        Some(url_type) => registry.get_service_url(service, env, url_type)?,
        None => registry.get_public_url(service, env)?,
    };
    println!("{}", resolved);
    Ok(())
}
