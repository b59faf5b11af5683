// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for kernelctl

pub mod peer;
pub mod registry;
pub mod serve;

pub use self::peer::PeerCommand;
pub use self::registry::RegistryCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;

use constellation_kernel::domain::config::KernelConfig;
use constellation_kernel::domain::service::ServiceRole;
use constellation_kernel::Kernel;

/// Name a client-side kernel reports when `SERVICE_NAME` is unset.
pub const CLIENT_SERVICE_NAME: &str = "kernelctl";

/// Kernel used by commands that only call out to peers. `SERVICE_NAME` and
/// `SERVICE_ROLE` are optional here.
pub fn client_kernel(registry: Option<PathBuf>) -> Result<Kernel> {
    let mut config = KernelConfig::from_env().context("Failed to read kernel configuration")?;
    if config.service_name.is_empty() {
        config.service_name = CLIENT_SERVICE_NAME.to_string();
    }
    if config.service_role.is_empty() {
        config.service_role = ServiceRole::Core.as_str().to_string();
    }
    if registry.is_some() {
        config.registry_file = registry;
    }
    Kernel::new(config).context("Failed to initialize kernel")
}
