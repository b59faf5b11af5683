// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Identity Service - this process's live self-description
//!
//! Structural fields (name, role, URLs, host, pid...) cannot change without a
//! restart and are computed once. Uptime and `last_check` are recomputed on
//! every read. Health status only changes through `set_health_status`.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;

use crate::domain::config::{ConfigError, KernelConfig};
use crate::domain::identity::{HealthReport, HealthStatus, IdentityUrls, KernelIdentity, RuntimeInfo};
use crate::domain::service::{ServiceRole, UrlType};
use crate::infrastructure::logger::Logger;
use crate::infrastructure::registry::ServiceRegistry;

/// Capabilities every kernel-embedding service provides.
pub const KERNEL_CAPABILITIES: [&str; 6] = ["identity", "rpc", "events", "jobs", "state", "logs"];

/// The part of the identity computed once.
#[derive(Debug, Clone)]
struct StaticIdentity {
    name: String,
    role: ServiceRole,
    version: String,
    urls: IdentityUrls,
    hostname: String,
    port: u16,
    pid: u32,
    capabilities: Vec<String>,
}

pub struct IdentityService {
    config: Arc<KernelConfig>,
    registry: Arc<ServiceRegistry>,
    started: Instant,
    started_at: DateTime<Utc>,
    cached: OnceLock<StaticIdentity>,
    health: RwLock<HealthStatus>,
    logger: Logger,
}

impl IdentityService {
    /// Fails only if the configured role does not parse, which a validated
    /// config rules out.
    pub fn new(
        config: Arc<KernelConfig>,
        registry: Arc<ServiceRegistry>,
        logger: Logger,
    ) -> Result<Self, ConfigError> {
        config.role()?;
        Ok(Self {
            config,
            registry,
            started: Instant::now(),
            started_at: Utc::now(),
            cached: OnceLock::new(),
            health: RwLock::new(HealthStatus::default()),
            logger: logger.child("identity"),
        })
    }

    pub fn get_identity(&self) -> KernelIdentity {
        let fixed = self.cached.get_or_init(|| self.compute_static());
        KernelIdentity {
            name: fixed.name.clone(),
            role: fixed.role,
            version: fixed.version.clone(),
            environment: self.config.environment,
            urls: fixed.urls.clone(),
            runtime: RuntimeInfo {
                hostname: fixed.hostname.clone(),
                port: fixed.port,
                pid: fixed.pid,
                started_at: self.started_at,
                uptime_seconds: self.uptime_seconds(),
            },
            health: self.health_status(),
            capabilities: fixed.capabilities.clone(),
            last_check: Utc::now(),
        }
    }

    pub fn health_status(&self) -> HealthStatus {
        *self.health.read()
    }

    /// The only mutator. Intended for application health-check logic.
    pub fn set_health_status(&self, status: HealthStatus) {
        let previous = std::mem::replace(&mut *self.health.write(), status);
        if previous != status {
            self.logger.info(
                format!("Health status changed from {previous} to {status}"),
                json!({ "from": previous, "to": status }),
            );
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Body for `GET /health`.
    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            status: self.health_status(),
            service: Some(self.config.service_name.clone()),
            version: Some(self.config.version.clone()),
            uptime_seconds: Some(self.uptime_seconds()),
            extra: serde_json::Map::new(),
        }
    }

    fn compute_static(&self) -> StaticIdentity {
        // Validated in `new`.
        let role = self.config.role().unwrap_or(ServiceRole::Core);
        let env = self.config.environment;
        let port = self.config.port();

        let entry = self.registry.get_by_role(role).ok();
        let resolve = |url_type: UrlType| {
            self.config
                .peer_override(role, url_type)
                .map(str::to_string)
                .or_else(|| {
                    entry.and_then(|e| e.urls.for_env(env).get(url_type).map(str::to_string))
                })
                .unwrap_or_else(|| format!("http://localhost:{port}"))
        };
        let urls = IdentityUrls {
            external: resolve(UrlType::External),
            peer: resolve(UrlType::Peer),
            internal: resolve(UrlType::Internal),
        };

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let mut capabilities: Vec<String> = KERNEL_CAPABILITIES.iter().map(|c| c.to_string()).collect();
        for extra in &self.config.capabilities {
            if !capabilities.contains(extra) {
                capabilities.push(extra.clone());
            }
        }

        StaticIdentity {
            name: self.config.service_name.clone(),
            role,
            version: self.config.version.clone(),
            urls,
            hostname,
            port,
            pid: std::process::id(),
            capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::Environment;
    use std::collections::HashMap;

    fn service(pairs: &[(&str, &str)]) -> IdentityService {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = KernelConfig::from_lookup(|k| map.get(k).cloned()).unwrap();
        IdentityService::new(
            Arc::new(config),
            Arc::new(ServiceRegistry::builtin()),
            Logger::new("test", 10),
        )
        .unwrap()
    }

    #[test]
    fn test_identity_fields() {
        let identity = service(&[
            ("SERVICE_NAME", "api"),
            ("SERVICE_ROLE", "api"),
            ("ENVIRONMENT", "production"),
            ("PORT", "8081"),
            ("SERVICE_VERSION", "2.3.1"),
            ("SERVICE_CAPABILITIES", "billing,rpc"),
        ])
        .get_identity();

        assert_eq!(identity.name, "api");
        assert_eq!(identity.role, ServiceRole::Api);
        assert_eq!(identity.version, "2.3.1");
        assert_eq!(identity.environment, Environment::Production);
        assert_eq!(identity.urls.external, "https://api.constellation.run");
        assert_eq!(identity.urls.internal, "http://api.railway.internal:8081");
        assert_eq!(identity.runtime.port, 8081);
        assert_eq!(identity.runtime.pid, std::process::id());
        assert_eq!(identity.health, HealthStatus::Healthy);
        assert!(identity.capabilities.contains(&"billing".to_string()));
        assert_eq!(
            identity.capabilities.iter().filter(|c| c.as_str() == "rpc").count(),
            1
        );
    }

    #[test]
    fn test_liveness_fields_refresh() {
        let svc = service(&[("SERVICE_NAME", "core"), ("SERVICE_ROLE", "core")]);
        let first = svc.get_identity();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = svc.get_identity();

        assert!(second.last_check > first.last_check);
        assert_eq!(first.runtime.started_at, second.runtime.started_at);
        assert_eq!(first.urls, second.urls);
    }

    #[test]
    fn test_health_status_is_explicit() {
        let svc = service(&[("SERVICE_NAME", "core"), ("SERVICE_ROLE", "core")]);
        assert_eq!(svc.get_identity().health, HealthStatus::Healthy);

        svc.set_health_status(HealthStatus::Degraded);
        assert_eq!(svc.get_identity().health, HealthStatus::Degraded);
        assert_eq!(svc.health_report().status, HealthStatus::Degraded);
        assert_eq!(svc.health_report().service.as_deref(), Some("core"));
    }

    #[test]
    fn test_own_url_override() {
        let identity = service(&[
            ("SERVICE_NAME", "core"),
            ("SERVICE_ROLE", "core"),
            ("CORE_URL", "https://core.preview.example"),
        ])
        .get_identity();
        assert_eq!(identity.urls.external, "https://core.preview.example");
        assert_eq!(identity.urls.internal, "http://127.0.0.1:8080");
    }
}
