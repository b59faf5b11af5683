// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Sys HTTP surface
//!
//! The endpoints every kernel-embedding service answers on:
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Health report, 503 while unhealthy |
//! | `GET /v1/sys/identity` | Full [`KernelIdentity`] |
//! | `POST /v1/sys/rpc` | Dispatch an RPC envelope to a registered method |
//! | `GET /v1/sys/logs` | Recent log entries (`level`, `limit`, `offset`) |

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::{json, Value};
use thiserror::Error;

use crate::application::kernel::Kernel;
use crate::domain::identity::{HealthReport, KernelIdentity};
use crate::domain::log::{LogEntry, LogQuery};
use crate::domain::rpc::{codes, RpcErrorBody, RpcRequest, RpcResponse, IDENTITY_PATH, LOGS_PATH, RPC_PATH};
use crate::infrastructure::panic::panic_message;

/// Error a method can return to control the `code` and `details` the caller
/// sees. Any other error is reported as `HANDLER_ERROR`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct MethodError {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl MethodError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

type RpcMethod = Arc<dyn Fn(Kernel, Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Named methods served on `POST /v1/sys/rpc`.
#[derive(Clone, Default)]
pub struct RpcMethods {
    methods: HashMap<String, RpcMethod>,
}

impl RpcMethods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method`, replacing any previous method of the same name.
    pub fn register<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Kernel, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |kernel, params| method(kernel, params).boxed()));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, name: &str) -> Option<RpcMethod> {
        self.methods.get(name).cloned()
    }
}

#[derive(Clone)]
struct SysState {
    kernel: Kernel,
    methods: Arc<RpcMethods>,
}

pub fn router(kernel: Kernel, methods: RpcMethods) -> Router {
    let state = SysState {
        kernel,
        methods: Arc::new(methods),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route(IDENTITY_PATH, get(identity_handler))
        .route(RPC_PATH, post(rpc_handler))
        .route(LOGS_PATH, get(logs_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<SysState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.kernel.identity.health_report();
    let status = if report.status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn identity_handler(State(state): State<SysState>) -> Json<KernelIdentity> {
    Json(state.kernel.identity.get_identity())
}

async fn logs_handler(State(state): State<SysState>, Query(query): Query<LogQuery>) -> Json<Vec<LogEntry>> {
    Json(state.kernel.logger.get_logs(&query))
}

async fn rpc_handler(
    State(state): State<SysState>,
    payload: Result<Json<RpcRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return failure(
                StatusCode::BAD_REQUEST,
                RpcErrorBody::new(codes::INVALID_REQUEST, rejection.body_text()),
            )
        }
    };

    let logger = state.kernel.logger.child("sys");
    let Some(method) = state.methods.get(&request.method) else {
        logger.warn(
            format!("Unknown RPC method {}", request.method),
            json!({ "method": request.method }),
        );
        return failure(
            StatusCode::NOT_FOUND,
            RpcErrorBody::new(
                codes::METHOD_NOT_FOUND,
                format!("Method {} is not registered", request.method),
            ),
        );
    };

    let timeout = request
        .timeout
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.kernel.config.rpc_timeout());
    let started = Instant::now();
    let invocation = AssertUnwindSafe(method(state.kernel.clone(), request.params)).catch_unwind();

    let (status, response) = match tokio::time::timeout(timeout, invocation).await {
        Ok(Ok(Ok(result))) => (StatusCode::OK, RpcResponse::success(result)),
        Ok(Ok(Err(err))) => {
            let body = method_error_body(&err);
            logger.error(
                format!("RPC method {} failed: {}", request.method, body.message),
                json!({ "method": request.method, "code": body.code }),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, RpcResponse::failure(body))
        }
        Ok(Err(panic)) => {
            let message = panic_message(&*panic);
            logger.error(
                format!("RPC method {} panicked: {message}", request.method),
                json!({ "method": request.method }),
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                RpcResponse::failure(RpcErrorBody::new(codes::HANDLER_ERROR, message)),
            )
        }
        Err(_) => {
            logger.warn(
                format!("RPC method {} exceeded {}ms", request.method, timeout.as_millis()),
                json!({ "method": request.method, "timeout_ms": timeout.as_millis() as u64 }),
            );
            (
                StatusCode::GATEWAY_TIMEOUT,
                RpcResponse::failure(RpcErrorBody::new(
                    codes::TIMEOUT,
                    format!("Method {} timed out after {}ms", request.method, timeout.as_millis()),
                )),
            )
        }
    };

    counter!(
        "kernel_rpc_served_total",
        "method" => request.method.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    histogram!("kernel_rpc_served_duration_seconds", "method" => request.method)
        .record(started.elapsed().as_secs_f64());

    (status, Json(response)).into_response()
}

fn method_error_body(err: &anyhow::Error) -> RpcErrorBody {
    if let Some(method_error) = err.downcast_ref::<MethodError>() {
        let body = RpcErrorBody::new(method_error.code.clone(), method_error.message.clone());
        return match &method_error.details {
            Some(details) => body.with_details(details.clone()),
            None => body,
        };
    }

    let body = RpcErrorBody::new(codes::HANDLER_ERROR, err.to_string());
    let causes: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
    if causes.is_empty() {
        body
    } else {
        body.with_details(json!({ "causes": causes }))
    }
}

fn failure(status: StatusCode, error: RpcErrorBody) -> Response {
    (status, Json(RpcResponse::failure(error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::KernelConfig;
    use crate::domain::identity::HealthStatus;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn kernel() -> Kernel {
        let config = KernelConfig::from_lookup(|k| match k {
            "SERVICE_NAME" => Some("core".to_string()),
            "SERVICE_ROLE" => Some("core".to_string()),
            _ => None,
        })
        .unwrap();
        Kernel::new(config).unwrap()
    }

    fn methods() -> RpcMethods {
        RpcMethods::new()
            .register("echo", |_kernel, params| async move { Ok(params) })
            .register("boom", |_kernel, _params| async move {
                Err(anyhow::anyhow!("database unavailable"))
            })
            .register("typed", |_kernel, _params| async move {
                Err(anyhow::Error::new(
                    MethodError::new("QUOTA_EXCEEDED", "too many requests")
                        .with_details(json!({ "limit": 10 })),
                ))
            })
            .register("slow", |_kernel, _params| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn rpc(body: Value) -> Request<Body> {
        Request::post(RPC_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_tracks_status() {
        let kernel = kernel();
        let app = router(kernel.clone(), RpcMethods::new());

        let (status, body) = send(app.clone(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "core");
        assert!(body["uptimeSeconds"].is_u64());
        assert!(body.get("uptime_seconds").is_none());

        kernel.identity.set_health_status(HealthStatus::Degraded);
        let (status, _) = send(app.clone(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);

        kernel.identity.set_health_status(HealthStatus::Unhealthy);
        let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_identity_endpoint() {
        let app = router(kernel(), RpcMethods::new());
        let (status, body) = send(app, Request::get(IDENTITY_PATH).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "core");
        assert_eq!(body["role"], "core");
        assert!(body["runtime"]["uptimeSeconds"].is_u64());
    }

    #[tokio::test]
    async fn test_rpc_success_and_unknown_method() {
        let app = router(kernel(), methods());

        let (status, body) = send(app.clone(), rpc(json!({ "method": "echo", "params": { "a": 1 } }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "result": { "a": 1 } }));

        let (status, body) = send(app, rpc(json!({ "method": "nope" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rpc_handler_failures() {
        let app = router(kernel(), methods());

        let (status, body) = send(app.clone(), rpc(json!({ "method": "boom" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], codes::HANDLER_ERROR);
        assert_eq!(body["error"]["message"], "database unavailable");

        let (status, body) = send(app.clone(), rpc(json!({ "method": "typed" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
        assert_eq!(body["error"]["details"]["limit"], 10);

        let (status, body) = send(app, rpc(json!({ "params": {} }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_rpc_respects_envelope_timeout() {
        let app = router(kernel(), methods());
        let started = Instant::now();
        let (status, body) = send(app, rpc(json!({ "method": "slow", "timeout": 50 }))).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"]["code"], codes::TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_logs_endpoint_filters() {
        let kernel = kernel();
        kernel.logger.debug("noise", Value::Null);
        kernel.logger.error("disk full", Value::Null);
        let app = router(kernel, RpcMethods::new());

        let (status, body) = send(
            app,
            Request::get(format!("{LOGS_PATH}?level=error&limit=5"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "disk full");
    }
}
