// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! RPC Client - resolves a peer through the registry and invokes it over HTTP
//!
//! Every call gets a hard deadline enforced on our side: the whole exchange
//! (connect, send, read body) runs under `tokio::time::timeout`, so a peer that
//! never answers cannot hold the caller past the deadline. Failures are
//! logged here and returned as a tagged `RpcError`; nothing is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::domain::config::KernelConfig;
use crate::domain::identity::{HealthReport, KernelIdentity};
use crate::domain::log::LogLevel;
use crate::domain::rpc::{RpcRequest, RpcResponse, IDENTITY_PATH, RPC_PATH};
use crate::domain::service::UrlType;
use crate::infrastructure::logger::Logger;
use crate::infrastructure::registry::{RegistryError, ServiceRegistry};

const MAX_ERROR_BODY: usize = 512;

/// Coarse classification of an RPC failure, so callers can tell an
/// unreachable peer from a peer that answered with an application error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    /// The service name is not in the registry.
    Lookup,
    /// The deadline expired before the exchange finished.
    Timeout,
    /// Connection or protocol failure before a response was read.
    Transport,
    /// The peer answered with a non-2xx status and no error envelope.
    Http,
    /// The peer answered with an `{error}` envelope.
    Remote,
    /// Params could not be encoded or the response could not be decoded.
    Serialization,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Cannot resolve service {service}: {source}")]
    Lookup {
        service: String,
        #[source]
        source: RegistryError,
    },

    #[error("Call to {service} ({operation}) timed out after {timeout_ms}ms")]
    Timeout {
        service: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("Failed to reach {service}: {source}")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with HTTP {status}: {body}")]
    Http {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service}.{method} failed: [{code}] {message}")]
    Remote {
        service: String,
        method: String,
        status: u16,
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Invalid RPC payload for {service}: {message}")]
    Serialization { service: String, message: String },
}

impl RpcError {
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            RpcError::Lookup { .. } => RpcErrorKind::Lookup,
            RpcError::Timeout { .. } => RpcErrorKind::Timeout,
            RpcError::Transport { .. } => RpcErrorKind::Transport,
            RpcError::Http { .. } => RpcErrorKind::Http,
            RpcError::Remote { .. } => RpcErrorKind::Remote,
            RpcError::Serialization { .. } => RpcErrorKind::Serialization,
        }
    }

    /// Whether the peer could not be reached or did not answer in time.
    pub fn is_unreachable(&self) -> bool {
        matches!(self.kind(), RpcErrorKind::Timeout | RpcErrorKind::Transport)
    }
}

#[derive(Clone)]
pub struct RpcClient {
    http: Client,
    registry: Arc<ServiceRegistry>,
    config: Arc<KernelConfig>,
    logger: Logger,
}

impl RpcClient {
    pub fn new(registry: Arc<ServiceRegistry>, config: Arc<KernelConfig>, logger: Logger) -> Self {
        // No client-wide timeout: every call carries its own deadline.
        let http = Client::builder()
            .user_agent(concat!("constellation-kernel/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            registry,
            config,
            logger: logger.child("rpc"),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.rpc_timeout()
    }

    /// Base URL used to reach `service` from inside the platform network:
    /// the configured `<ROLE>_INTERNAL_URL` override, else the registry entry.
    pub fn resolve_internal_url(&self, service: &str) -> Result<String, RpcError> {
        let lookup = |source| RpcError::Lookup {
            service: service.to_string(),
            source,
        };
        let endpoint = self.registry.get(service).map_err(lookup)?;
        let url = match self.config.peer_override(endpoint.role, UrlType::Internal) {
            Some(url) => url.to_string(),
            None => self
                .registry
                .get_internal_url(service, self.config.environment)
                .map_err(lookup)?,
        };
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Invoke `method` on `service` through its `/v1/sys/rpc` endpoint.
    pub async fn call<T, P>(
        &self,
        service: &str,
        method: &str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());
        let started = Instant::now();

        let outcome = self.call_inner(service, method, params, timeout).await;
        self.record(service, method, started, &outcome, LogLevel::Error);
        outcome
    }

    async fn call_inner<T, P>(
        &self,
        service: &str,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let base = self.resolve_internal_url(service)?;
        let params = serde_json::to_value(params).map_err(|e| RpcError::Serialization {
            service: service.to_string(),
            message: format!("cannot encode params: {e}"),
        })?;
        let envelope = RpcRequest {
            method: method.to_string(),
            params,
            timeout: Some(timeout.as_millis() as u64),
        };

        let request = self
            .http
            .post(format!("{base}{RPC_PATH}"))
            .header("x-kernel-caller", self.config.service_name.as_str())
            .json(&envelope);
        let (status, body) = self.exchange(service, method, request, timeout).await?;

        let raw = serde_json::from_str::<serde_json::Value>(&body).ok();
        let parsed = raw
            .clone()
            .and_then(|value| serde_json::from_value::<RpcResponse>(value).ok());
        if let Some(error) = parsed.as_ref().and_then(|r| r.error.clone()) {
            return Err(RpcError::Remote {
                service: service.to_string(),
                method: method.to_string(),
                status: status.as_u16(),
                code: error.code,
                message: error.message,
                details: error.details,
            });
        }
        if !status.is_success() {
            return Err(http_error(service, status, &body));
        }

        let not_envelope = |message: &str| RpcError::Serialization {
            service: service.to_string(),
            message: message.to_string(),
        };
        let response = parsed.ok_or_else(|| not_envelope("response is not an RPC envelope"))?;
        // `{}` is a valid empty result; any other object must carry one of the two fields.
        if let Some(fields) = raw.as_ref().and_then(|v| v.as_object()) {
            if !fields.is_empty() && !fields.contains_key("result") && !fields.contains_key("error") {
                return Err(not_envelope("response carries neither result nor error"));
            }
        }
        decode(service, response.result.unwrap_or(serde_json::Value::Null))
    }

    /// `GET <internal><health_check_path>`.
    pub async fn get_health(&self, service: &str) -> Result<HealthReport, RpcError> {
        self.health(service, LogLevel::Error).await
    }

    async fn health(&self, service: &str, failure_level: LogLevel) -> Result<HealthReport, RpcError> {
        let path = self
            .registry
            .get(service)
            .map(|s| s.health_check_path.clone())
            .map_err(|source| RpcError::Lookup {
                service: service.to_string(),
                source,
            })?;
        self.get_json(service, &path, failure_level).await
    }

    /// `GET <internal>/v1/sys/identity`.
    pub async fn get_identity(&self, service: &str) -> Result<KernelIdentity, RpcError> {
        self.get_json(service, IDENTITY_PATH, LogLevel::Error).await
    }

    /// Liveness check: true only if the health endpoint answered successfully.
    /// Failed checks are logged at debug level.
    pub async fn ping(&self, service: &str) -> bool {
        self.health(service, LogLevel::Debug).await.is_ok()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        failure_level: LogLevel,
    ) -> Result<T, RpcError> {
        let started = Instant::now();
        let outcome = async {
            let base = self.resolve_internal_url(service)?;
            let request = self
                .http
                .get(format!("{base}{path}"))
                .header("x-kernel-caller", self.config.service_name.as_str());
            let (status, body) = self
                .exchange(service, path, request, self.default_timeout())
                .await?;
            if !status.is_success() {
                return Err(http_error(service, status, &body));
            }
            let value = serde_json::from_str::<serde_json::Value>(&body).map_err(|e| {
                RpcError::Serialization {
                    service: service.to_string(),
                    message: e.to_string(),
                }
            })?;
            decode(service, value)
        }
        .await;
        self.record(service, path, started, &outcome, failure_level);
        outcome
    }

    /// Send the request and read the body, all under one deadline.
    async fn exchange(
        &self,
        service: &str,
        operation: &str,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<(StatusCode, String), RpcError> {
        let transport = |source| RpcError::Transport {
            service: service.to_string(),
            source,
        };
        let exchange = async {
            let response = request.send().await.map_err(transport)?;
            let status = response.status();
            let body = response.text().await.map_err(transport)?;
            Ok::<_, RpcError>((status, body))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout {
                service: service.to_string(),
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    fn record<T>(
        &self,
        service: &str,
        operation: &str,
        started: Instant,
        outcome: &Result<T, RpcError>,
        failure_level: LogLevel,
    ) {
        let elapsed = started.elapsed();
        let label = match outcome {
            Ok(_) => "ok",
            Err(_) => "error",
        };
        metrics::counter!(
            "kernel_rpc_calls_total",
            "service" => service.to_string(),
            "operation" => operation.to_string(),
            "outcome" => label,
        )
        .increment(1);
        metrics::histogram!("kernel_rpc_call_duration_seconds", "service" => service.to_string())
            .record(elapsed.as_secs_f64());

        if let Err(e) = outcome {
            self.logger.log(
                failure_level,
                format!("RPC to {service} ({operation}) failed: {e}"),
                json!({
                    "service": service,
                    "operation": operation,
                    "kind": e.kind(),
                    "elapsed_ms": elapsed.as_millis() as u64,
                }),
            );
        }
    }
}

fn http_error(service: &str, status: StatusCode, body: &str) -> RpcError {
    let mut body = body.trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    RpcError::Http {
        service: service.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn decode<T: DeserializeOwned>(service: &str, value: serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::Serialization {
        service: service.to_string(),
        message: format!("cannot decode result: {e}"),
    })
}
