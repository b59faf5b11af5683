// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

// Kernel Configuration - process identity and peer URL overrides
//
// Loaded once at startup from environment variables:
// - SERVICE_NAME / SERVICE_ROLE (required)
// - ENVIRONMENT, PORT, SERVICE_VERSION, SERVICE_CAPABILITIES
// - LOG_LEVEL, KERNEL_LOG_CAPACITY, KERNEL_RPC_TIMEOUT_MS
// - KERNEL_REGISTRY_FILE (alternative service table)
// - <ROLE>_URL / <ROLE>_INTERNAL_URL per known peer
//
// The result is an immutable snapshot; changing the environment requires a restart.

use crate::domain::log::LogLevel;
use crate::domain::service::{Environment, ServiceRole, UrlType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

/// Explicit per-peer URL overrides. Unset fields fall back to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    pub service_name: String,
    /// Raw role string as configured. Parsed by `role()`; kept raw so that
    /// validation can report an empty value separately from an unknown one.
    pub service_role: String,
    #[serde(default)]
    pub environment: Environment,
    pub port: u32,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub log_level: String,
    pub log_capacity: usize,
    pub rpc_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_file: Option<PathBuf>,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub peers: BTreeMap<ServiceRole, PeerOverride>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SERVICE_NAME must be set and non-empty")]
    MissingServiceName,

    #[error("SERVICE_ROLE must be set and non-empty")]
    MissingServiceRole,

    #[error("Invalid SERVICE_ROLE: {0}")]
    InvalidRole(#[from] crate::domain::service::ParseVocabularyError),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("PORT must be between 1 and 65535, got {0}")]
    PortOutOfRange(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl KernelConfig {
    /// Read the configuration from the process environment. Does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = match get("ENVIRONMENT") {
            Some(raw) => raw.parse::<Environment>().map_err(|e| ConfigError::InvalidValue {
                key: "ENVIRONMENT".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => Environment::default(),
        };

        let port = parse_number::<u32>(&get, "PORT")?.unwrap_or(DEFAULT_PORT as u32);
        let log_capacity =
            parse_number::<usize>(&get, "KERNEL_LOG_CAPACITY")?.unwrap_or(DEFAULT_LOG_CAPACITY);
        let rpc_timeout_ms =
            parse_number::<u64>(&get, "KERNEL_RPC_TIMEOUT_MS")?.unwrap_or(DEFAULT_RPC_TIMEOUT_MS);

        let capabilities = get("SERVICE_CAPABILITIES")
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let test_mode = get("KERNEL_TEST_MODE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let mut peers = BTreeMap::new();
        for role in ServiceRole::ALL {
            let prefix = role.env_prefix();
            let peer = PeerOverride {
                external: get(&format!("{prefix}_URL")),
                internal: get(&format!("{prefix}_INTERNAL_URL")),
            };
            if peer.external.is_some() || peer.internal.is_some() {
                peers.insert(role, peer);
            }
        }

        Ok(Self {
            service_name: get("SERVICE_NAME").unwrap_or_default(),
            service_role: get("SERVICE_ROLE").unwrap_or_default(),
            environment,
            port,
            version: get("SERVICE_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            capabilities,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_capacity,
            rpc_timeout_ms,
            registry_file: get("KERNEL_REGISTRY_FILE").map(PathBuf::from),
            test_mode,
            peers,
        })
    }

    /// Load and validate from the environment. A failure is fatal outside test
    /// mode: the error is logged and the process exits with status 1.
    pub fn load() -> Result<Self, ConfigError> {
        // Parsed KERNEL_TEST_MODE when parsing got that far, else the raw variable.
        let (result, test_mode) = match Self::from_env() {
            Ok(config) => {
                let test_mode = config.test_mode;
                (config.validate().map(|_| config), test_mode)
            }
            Err(e) => (Err(e), env_test_mode()),
        };

        match result {
            Ok(config) => {
                info!(
                    service = %config.service_name,
                    role = %config.service_role,
                    environment = %config.environment,
                    port = config.port,
                    "Kernel configuration loaded"
                );
                Ok(config)
            }
            Err(e) if test_mode || cfg!(test) => Err(e),
            Err(e) => {
                error!(error = %e, "Invalid kernel configuration, aborting startup");
                std::process::exit(1);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        if self.service_role.trim().is_empty() {
            return Err(ConfigError::MissingServiceRole);
        }
        self.role()?;
        if self.port == 0 || self.port > u16::MAX as u32 {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        self.log_level()?;
        if self.log_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "KERNEL_LOG_CAPACITY must be greater than zero".to_string(),
            ));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "KERNEL_RPC_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        for (role, peer) in &self.peers {
            let prefix = role.env_prefix();
            if let Some(url) = &peer.external {
                check_http_url(&format!("{prefix}_URL"), url)?;
            }
            if let Some(url) = &peer.internal {
                check_http_url(&format!("{prefix}_INTERNAL_URL"), url)?;
            }
        }
        Ok(())
    }

    pub fn role(&self) -> Result<ServiceRole, ConfigError> {
        Ok(self.service_role.parse::<ServiceRole>()?)
    }

    /// Minimum severity the kernel logger records.
    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.log_level
            .parse::<LogLevel>()
            .map_err(|reason| ConfigError::InvalidValue {
                key: "LOG_LEVEL".to_string(),
                value: self.log_level.clone(),
                reason,
            })
    }

    /// Port as a validated `u16`. Falls back to the default for out-of-range
    /// values, which `validate()` rejects before a kernel is built.
    pub fn port(&self) -> u16 {
        u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Configured override for a peer URL, if any. Only external and internal
    /// URLs can be overridden.
    pub fn peer_override(&self, role: ServiceRole, url_type: UrlType) -> Option<&str> {
        let peer = self.peers.get(&role)?;
        match url_type {
            UrlType::External => peer.external.as_deref(),
            UrlType::Internal => peer.internal.as_deref(),
            UrlType::Peer | UrlType::Proxy => None,
        }
    }
}

fn env_test_mode() -> bool {
    std::env::var("KERNEL_TEST_MODE")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_number<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn check_http_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config =
            KernelConfig::from_lookup(lookup(&[("SERVICE_NAME", "api"), ("SERVICE_ROLE", "api")]))
                .unwrap();
        config.validate().unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.log_capacity, DEFAULT_LOG_CAPACITY);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(10));
        assert_eq!(config.log_level, "info");
        assert!(config.peers.is_empty());
        assert!(config.capabilities.is_empty());
    }

    #[test]
    fn test_missing_name_fails_validation() {
        let config = KernelConfig::from_lookup(lookup(&[("SERVICE_ROLE", "core")])).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingServiceName)));
    }

    #[test]
    fn test_missing_and_unknown_role() {
        let config = KernelConfig::from_lookup(lookup(&[("SERVICE_NAME", "x")])).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingServiceRole)));

        let config =
            KernelConfig::from_lookup(lookup(&[("SERVICE_NAME", "x"), ("SERVICE_ROLE", "gateway")]))
                .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRole(_))));
    }

    #[test]
    fn test_port_bounds() {
        for bad in ["0", "65536", "70000"] {
            let config = KernelConfig::from_lookup(lookup(&[
                ("SERVICE_NAME", "core"),
                ("SERVICE_ROLE", "core"),
                ("PORT", bad),
            ]))
            .unwrap();
            assert!(matches!(config.validate(), Err(ConfigError::PortOutOfRange(_))));
        }

        let not_a_number = KernelConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "core"),
            ("SERVICE_ROLE", "core"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(not_a_number, Err(ConfigError::InvalidValue { .. })));

        let ok = KernelConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "core"),
            ("SERVICE_ROLE", "core"),
            ("PORT", "65535"),
        ]))
        .unwrap();
        ok.validate().unwrap();
        assert_eq!(ok.port(), 65535);
    }

    #[test]
    fn test_peer_overrides_and_capabilities() {
        let config = KernelConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "console"),
            ("SERVICE_ROLE", "console"),
            ("ENVIRONMENT", "production"),
            ("CORE_INTERNAL_URL", "http://10.0.0.5:9000"),
            ("API_URL", "https://api.staging-mirror.example"),
            ("SERVICE_CAPABILITIES", "render, search ,"),
        ]))
        .unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.peer_override(ServiceRole::Core, UrlType::Internal),
            Some("http://10.0.0.5:9000")
        );
        assert_eq!(config.peer_override(ServiceRole::Core, UrlType::External), None);
        assert_eq!(
            config.peer_override(ServiceRole::Api, UrlType::External),
            Some("https://api.staging-mirror.example")
        );
        assert_eq!(config.capabilities, vec!["render", "search"]);
    }

    #[test]
    fn test_invalid_override_scheme_rejected() {
        let config = KernelConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "web"),
            ("SERVICE_ROLE", "web"),
            ("CORE_INTERNAL_URL", "ftp://core"),
        ]))
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_log_level_parsed_and_validated() {
        let config = KernelConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "api"),
            ("SERVICE_ROLE", "api"),
            ("LOG_LEVEL", "WARNING"),
        ]))
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.log_level().unwrap(), LogLevel::Warn);

        let config = KernelConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "api"),
            ("SERVICE_ROLE", "api"),
            ("LOG_LEVEL", "verbose"),
        ]))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "LOG_LEVEL"
        ));
    }

    #[test]
    fn test_test_mode_flag() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("yes", true), ("0", false), ("off", false)] {
            let config = KernelConfig::from_lookup(lookup(&[
                ("SERVICE_NAME", "api"),
                ("SERVICE_ROLE", "api"),
                ("KERNEL_TEST_MODE", raw),
            ]))
            .unwrap();
            assert_eq!(config.test_mode, expected, "KERNEL_TEST_MODE={raw}");
        }
    }

    #[test]
    fn test_load_returns_error_in_test_mode() {
        // cfg(test) forces test mode, so an incomplete environment is reported
        // instead of terminating the test binary.
        if std::env::var("SERVICE_NAME").is_err() {
            assert!(KernelConfig::load().is_err());
        }
    }
}
