// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests of the RPC client against a live sys router.
//!
//! A "core" kernel serves its sys router on an ephemeral port; an "api"
//! kernel reaches it through `CORE_INTERNAL_URL`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{http::StatusCode, routing::post, Router};
use constellation_kernel::domain::config::KernelConfig;
use constellation_kernel::domain::identity::HealthStatus;
use constellation_kernel::domain::rpc::{codes, RPC_PATH};
use constellation_kernel::infrastructure::rpc_client::{RpcError, RpcErrorKind};
use constellation_kernel::presentation::{router, MethodError, RpcMethods};
use constellation_kernel::Kernel;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

fn config(pairs: &[(&str, String)]) -> KernelConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    KernelConfig::from_lookup(|k| map.get(k).cloned()).unwrap()
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn methods() -> RpcMethods {
    RpcMethods::new()
        .register("math.add", |_kernel, params| async move {
            let a = params["a"].as_i64().ok_or_else(|| MethodError::invalid_params("a must be an integer"))?;
            let b = params["b"].as_i64().ok_or_else(|| MethodError::invalid_params("b must be an integer"))?;
            Ok::<_, anyhow::Error>(json!({ "sum": a + b }))
        })
        .register("state.bump", |kernel: Kernel, _params| async move {
            let entry = kernel.state.increment("bumps", 1).await?;
            Ok::<_, anyhow::Error>(entry.value)
        })
        .register("sys.nothing", |_kernel, _params| async move { Ok(Value::Null) })
}

/// Returns the serving kernel and a client kernel pointed at it.
async fn pair() -> (Kernel, Kernel) {
    let server = Kernel::new(config(&[
        ("SERVICE_NAME", "core".to_string()),
        ("SERVICE_ROLE", "core".to_string()),
        ("SERVICE_VERSION", "9.9.9".to_string()),
    ]))
    .unwrap();
    let url = serve(router(server.clone(), methods())).await;

    let client = Kernel::new(config(&[
        ("SERVICE_NAME", "api".to_string()),
        ("SERVICE_ROLE", "api".to_string()),
        ("CORE_INTERNAL_URL", url),
    ]))
    .unwrap();
    (server, client)
}

#[derive(Debug, Serialize)]
struct AddParams {
    a: i64,
    b: i64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct AddResult {
    sum: i64,
}

#[tokio::test]
async fn test_typed_call_roundtrip() {
    let (server, client) = pair().await;

    let result: AddResult = client
        .rpc
        .call("core", "math.add", AddParams { a: 2, b: 40 }, None)
        .await
        .unwrap();
    assert_eq!(result, AddResult { sum: 42 });

    let first: i64 = client.rpc.call("core", "state.bump", json!({}), None).await.unwrap();
    let second: i64 = client.rpc.call("core", "state.bump", json!({}), None).await.unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(server.state.get_value("bumps").await.unwrap(), Some(json!(2)));

    let nothing: Option<String> = client.rpc.call("core", "sys.nothing", json!({}), None).await.unwrap();
    assert!(nothing.is_none());
}

#[tokio::test]
async fn test_remote_errors_carry_code() {
    let (_server, client) = pair().await;

    let err = client
        .rpc
        .call::<Value, _>("core", "math.add", json!({ "a": "two" }), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Remote);
    match err {
        RpcError::Remote { status, code, message, .. } => {
            assert_eq!(status, 500);
            assert_eq!(code, codes::INVALID_REQUEST);
            assert_eq!(message, "a must be an integer");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = client
        .rpc
        .call::<Value, _>("core", "does.not.exist", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Remote { status: 404, ref code, .. } if code == codes::METHOD_NOT_FOUND
    ));
    assert!(!err.is_unreachable());
}

#[tokio::test]
async fn test_deadline_is_enforced_by_caller() {
    // A peer that never answers in time, independent of the envelope timeout.
    let app = Router::new().route(
        RPC_PATH,
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "{}"
        }),
    );
    let url = serve(app).await;
    let client = Kernel::new(config(&[
        ("SERVICE_NAME", "shell".to_string()),
        ("SERVICE_ROLE", "shell".to_string()),
        ("CORE_INTERNAL_URL", url),
    ]))
    .unwrap();

    let started = Instant::now();
    let err = client
        .rpc
        .call::<Value, _>("core", "sys.slow", json!({}), Some(Duration::from_millis(150)))
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(err.kind(), RpcErrorKind::Timeout);
    assert!(err.is_unreachable());
    assert!(matches!(err, RpcError::Timeout { timeout_ms: 150, .. }));
}

#[tokio::test]
async fn test_ping_and_identity() {
    let (server, client) = pair().await;

    assert!(client.rpc.ping("core").await);
    let identity = client.rpc.get_identity("core").await.unwrap();
    assert_eq!(identity.name, "core");
    assert_eq!(identity.version, "9.9.9");

    let health = client.rpc.get_health("core").await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);

    server.identity.set_health_status(HealthStatus::Unhealthy);
    assert!(!client.rpc.ping("core").await);
    assert_eq!(client.rpc.get_identity("core").await.unwrap().health, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_non_envelope_http_failure() {
    let app = Router::new().route(
        RPC_PATH,
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
    );
    let url = serve(app).await;
    let client = Kernel::new(config(&[
        ("SERVICE_NAME", "web".to_string()),
        ("SERVICE_ROLE", "web".to_string()),
        ("OPERATOR_INTERNAL_URL", url),
    ]))
    .unwrap();

    let err = client
        .rpc
        .call::<Value, _>("operator", "anything", json!({}), None)
        .await
        .unwrap_err();
    match err {
        RpcError::Http { status, body, .. } => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_body_without_result_or_error_is_rejected() {
    let app = Router::new()
        .route(RPC_PATH, post(|| async { r#"{"status":"ok"}"# }))
        .route("/empty/v1/sys/rpc", post(|| async { "{}" }));
    let url = serve(app).await;
    let client = Kernel::new(config(&[
        ("SERVICE_NAME", "web".to_string()),
        ("SERVICE_ROLE", "web".to_string()),
        ("API_INTERNAL_URL", url.clone()),
        ("DOCS_INTERNAL_URL", format!("{url}/empty")),
    ]))
    .unwrap();

    let err = client
        .rpc
        .call::<Value, _>("api", "anything", json!({}), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Serialization);

    let empty: Value = client.rpc.call("docs", "anything", json!({}), None).await.unwrap();
    assert!(empty.is_null());
}

#[tokio::test]
async fn test_lookup_and_transport_failures() {
    // Reserve a port, then free it so nothing is listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Kernel::new(config(&[
        ("SERVICE_NAME", "console".to_string()),
        ("SERVICE_ROLE", "console".to_string()),
        ("DOCS_INTERNAL_URL", format!("http://{addr}")),
    ]))
    .unwrap();

    let err = client
        .rpc
        .call::<Value, _>("billing", "anything", json!({}), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Lookup);

    let err = client
        .rpc
        .call::<Value, _>("docs", "anything", json!({}), Some(Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Transport);
    assert!(!client.rpc.ping("docs").await);
}
