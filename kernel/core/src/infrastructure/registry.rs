// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Service Registry - static table of every known service
//!
//! Pure, read-only lookup of per-environment endpoints. The built-in table is
//! compiled in; an alternative table can be loaded from YAML at startup
//! (`KERNEL_REGISTRY_FILE`) but is never modified afterwards, so the registry
//! is shared as `Arc<ServiceRegistry>` without locking.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::service::{
    Environment, EnvironmentUrls, ServiceEndpoint, ServiceRole, ServiceUrls, UrlType,
};

const PUBLIC_DOMAIN: &str = "constellation.run";
const PEER_SUFFIX: &str = "up.railway.app";
const INTERNAL_SUFFIX: &str = "railway.internal";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("No service registered for role {0}")]
    UnknownRole(ServiceRole),

    #[error("Service {service} has no {url_type} URL in {environment}")]
    UrlNotConfigured {
        service: String,
        environment: Environment,
        url_type: UrlType,
    },

    #[error("Invalid service table: {0}")]
    InvalidTable(String),

    #[error("Failed to read service table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse service table: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    /// Entries in role order.
    services: Vec<ServiceEndpoint>,
    by_name: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct RegistryFile {
    services: Vec<ServiceEndpoint>,
}

impl ServiceRegistry {
    /// Build a registry, enforcing one entry per role, unique names and a
    /// non-empty production external URL.
    pub fn new(mut services: Vec<ServiceEndpoint>) -> Result<Self, RegistryError> {
        services.sort_by_key(|s| s.role);

        let mut roles = HashSet::new();
        let mut by_name = HashMap::new();
        for (idx, service) in services.iter().enumerate() {
            if service.name.trim().is_empty() {
                return Err(RegistryError::InvalidTable(
                    "service name must not be empty".to_string(),
                ));
            }
            if !roles.insert(service.role) {
                return Err(RegistryError::InvalidTable(format!(
                    "role {} is registered more than once",
                    service.role
                )));
            }
            if by_name.insert(service.name.clone(), idx).is_some() {
                return Err(RegistryError::InvalidTable(format!(
                    "service {} is registered more than once",
                    service.name
                )));
            }
            if service.urls.production.external.trim().is_empty() {
                return Err(RegistryError::InvalidTable(format!(
                    "service {} has no production external URL",
                    service.name
                )));
            }
        }

        Ok(Self { services, by_name })
    }

    /// The compiled-in constellation table.
    pub fn builtin() -> Self {
        let services = vec![
            hosted("core", ServiceRole::Core, 8080, "constellation-core", "core"),
            hosted("api", ServiceRole::Api, 8081, "constellation-api", "api")
                .with_proxy(Environment::Production, format!("https://edge.{PUBLIC_DOMAIN}/api")),
            hosted("operator", ServiceRole::Operator, 8082, "constellation-operator", "operator"),
            hosted("web", ServiceRole::Web, 3000, "constellation-web", "www")
                .with_proxy(Environment::Production, format!("https://edge.{PUBLIC_DOMAIN}")),
            hosted("console", ServiceRole::Console, 3001, "constellation-console", "console"),
            hosted("docs", ServiceRole::Docs, 3002, "constellation-docs", "docs"),
            hosted("shell", ServiceRole::Shell, 3003, "constellation-shell", "shell"),
            hosted("root", ServiceRole::Root, 3004, "constellation-root", ""),
        ];

        let mut by_name = HashMap::new();
        for (idx, service) in services.iter().enumerate() {
            by_name.insert(service.name.clone(), idx);
        }
        Self { services, by_name }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(raw)?;
        Self::new(file.services)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn services(&self) -> &[ServiceEndpoint] {
        &self.services
    }

    pub fn get(&self, name: &str) -> Result<&ServiceEndpoint, RegistryError> {
        self.by_name
            .get(name)
            .map(|idx| &self.services[*idx])
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))
    }

    pub fn get_by_role(&self, role: ServiceRole) -> Result<&ServiceEndpoint, RegistryError> {
        self.services
            .iter()
            .find(|s| s.role == role)
            .ok_or(RegistryError::UnknownRole(role))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get_service_url(
        &self,
        name: &str,
        env: Environment,
        url_type: UrlType,
    ) -> Result<String, RegistryError> {
        let service = self.get(name)?;
        service
            .urls
            .for_env(env)
            .get(url_type)
            .map(str::to_string)
            .ok_or_else(|| RegistryError::UrlNotConfigured {
                service: name.to_string(),
                environment: env,
                url_type,
            })
    }

    pub fn get_internal_url(&self, name: &str, env: Environment) -> Result<String, RegistryError> {
        self.get_service_url(name, env, UrlType::Internal)
    }

    /// Externally routable URL in production. Custom domains are not
    /// guaranteed before production, so other environments get the peer URL.
    pub fn get_public_url(&self, name: &str, env: Environment) -> Result<String, RegistryError> {
        if env.is_production() {
            self.get_service_url(name, env, UrlType::External)
        } else {
            self.get_service_url(name, env, UrlType::Peer)
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Entry following the platform naming scheme. `subdomain` is the public host
/// label; empty means the apex domain.
fn hosted(name: &str, role: ServiceRole, port: u16, repo: &str, subdomain: &str) -> ServiceEndpoint {
    let public = |env_label: Option<&str>| {
        let host = match (subdomain.is_empty(), env_label) {
            (true, None) => PUBLIC_DOMAIN.to_string(),
            (true, Some(env)) => format!("{env}.{PUBLIC_DOMAIN}"),
            (false, None) => format!("{subdomain}.{PUBLIC_DOMAIN}"),
            (false, Some(env)) => format!("{subdomain}.{env}.{PUBLIC_DOMAIN}"),
        };
        format!("https://{host}")
    };

    ServiceEndpoint {
        name: name.to_string(),
        role,
        urls: EnvironmentUrls {
            production: ServiceUrls {
                external: public(None),
                peer: format!("https://{name}-production.{PEER_SUFFIX}"),
                internal: format!("http://{name}.{INTERNAL_SUFFIX}:{port}"),
                proxy: None,
            },
            staging: ServiceUrls {
                external: public(Some("staging")),
                peer: format!("https://{name}-staging.{PEER_SUFFIX}"),
                internal: format!("http://{name}-staging.{INTERNAL_SUFFIX}:{port}"),
                proxy: None,
            },
            development: ServiceUrls {
                external: format!("http://localhost:{port}"),
                peer: format!("http://localhost:{port}"),
                internal: format!("http://127.0.0.1:{port}"),
                proxy: None,
            },
        },
        port,
        health_check_path: "/health".to_string(),
        repo: format!("github.com/constellation-platform/{repo}"),
    }
}

trait WithProxy {
    fn with_proxy(self, env: Environment, url: String) -> Self;
}

impl WithProxy for ServiceEndpoint {
    fn with_proxy(mut self, env: Environment, url: String) -> Self {
        let urls = match env {
            Environment::Production => &mut self.urls.production,
            Environment::Staging => &mut self.urls.staging,
            Environment::Development => &mut self.urls.development,
        };
        urls.proxy = Some(url);
        self
    }
}
