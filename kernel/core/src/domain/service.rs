// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Service vocabulary shared by the registry, config, identity and RPC layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The function a service plays inside the constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Core,
    Api,
    Operator,
    Web,
    Console,
    Docs,
    Shell,
    Root,
}

impl ServiceRole {
    pub const ALL: [ServiceRole; 8] = [
        ServiceRole::Core,
        ServiceRole::Api,
        ServiceRole::Operator,
        ServiceRole::Web,
        ServiceRole::Console,
        ServiceRole::Docs,
        ServiceRole::Shell,
        ServiceRole::Root,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Core => "core",
            ServiceRole::Api => "api",
            ServiceRole::Operator => "operator",
            ServiceRole::Web => "web",
            ServiceRole::Console => "console",
            ServiceRole::Docs => "docs",
            ServiceRole::Shell => "shell",
            ServiceRole::Root => "root",
        }
    }

    /// Prefix used for the per-peer URL override variables (`CORE_URL`, ...).
    pub fn env_prefix(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ServiceRole::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| ParseVocabularyError::Role(s.to_string()))
    }
}

/// Deployment environment. Each registry entry carries one URL set per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            "development" | "dev" | "local" => Ok(Environment::Development),
            _ => Err(ParseVocabularyError::Environment(s.to_string())),
        }
    }
}

/// Which of a service's URLs to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlType {
    /// Publicly routable name (custom domain).
    External,
    /// Platform-assigned public hostname, reachable before custom DNS exists.
    Peer,
    /// Private network address used for service-to-service traffic.
    Internal,
    /// Optional edge proxy in front of the service.
    Proxy,
}

impl UrlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlType::External => "external",
            UrlType::Peer => "peer",
            UrlType::Internal => "internal",
            UrlType::Proxy => "proxy",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlType {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" | "public" => Ok(UrlType::External),
            "peer" => Ok(UrlType::Peer),
            "internal" => Ok(UrlType::Internal),
            "proxy" => Ok(UrlType::Proxy),
            _ => Err(ParseVocabularyError::UrlType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseVocabularyError {
    #[error("Unknown service role '{0}' (expected one of core, api, operator, web, console, docs, shell, root)")]
    Role(String),

    #[error("Unknown environment '{0}' (expected production, staging or development)")]
    Environment(String),

    #[error("Unknown URL type '{0}' (expected external, peer, internal or proxy)")]
    UrlType(String),
}

/// URL set for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUrls {
    pub external: String,
    pub peer: String,
    pub internal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl ServiceUrls {
    pub fn get(&self, url_type: UrlType) -> Option<&str> {
        let url = match url_type {
            UrlType::External => self.external.as_str(),
            UrlType::Peer => self.peer.as_str(),
            UrlType::Internal => self.internal.as_str(),
            UrlType::Proxy => self.proxy.as_deref()?,
        };
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentUrls {
    pub production: ServiceUrls,
    pub staging: ServiceUrls,
    pub development: ServiceUrls,
}

impl EnvironmentUrls {
    pub fn for_env(&self, env: Environment) -> &ServiceUrls {
        match env {
            Environment::Production => &self.production,
            Environment::Staging => &self.staging,
            Environment::Development => &self.development,
        }
    }
}

/// Static descriptor of a known service. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub role: ServiceRole,
    pub urls: EnvironmentUrls,
    pub port: u16,
    #[serde(default = "default_health_path")]
    pub health_check_path: String,
    /// Repository that owns the service's deployment.
    pub repo: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("Operator".parse::<ServiceRole>().unwrap(), ServiceRole::Operator);
        assert_eq!(" root ".parse::<ServiceRole>().unwrap(), ServiceRole::Root);
        assert!("gateway".parse::<ServiceRole>().is_err());
    }

    #[test]
    fn test_environment_aliases() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("local".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!(Environment::default(), Environment::Development);
    }

    #[test]
    fn test_missing_proxy_resolves_to_none() {
        let urls = ServiceUrls {
            external: "https://a.example".into(),
            peer: "https://a.up.example".into(),
            internal: "http://a.internal:8080".into(),
            proxy: None,
        };
        assert_eq!(urls.get(UrlType::Internal), Some("http://a.internal:8080"));
        assert_eq!(urls.get(UrlType::Proxy), None);
    }
}
