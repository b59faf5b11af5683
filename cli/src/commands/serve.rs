// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! `kernelctl serve` - the sys API with a small set of built-in methods

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use constellation_kernel::domain::config::KernelConfig;
use constellation_kernel::domain::job::JobStatus;
use constellation_kernel::presentation::{router, MethodError, RpcMethods};
use constellation_kernel::Kernel;

pub async fn run(host: &str, registry_file: Option<PathBuf>) -> Result<()> {
    let mut config = KernelConfig::load().context("Invalid kernel configuration")?;
    if registry_file.is_some() {
        config.registry_file = registry_file;
    }
    let kernel = Kernel::new(config).context("Failed to initialize kernel")?;

    let app = router(kernel.clone(), builtin_methods());
    let addr = format!("{}:{}", host, kernel.config.port());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(service = %kernel.service_name(), "Sys API listening on {}", addr);
    kernel
        .events
        .emit("kernel.started", json!({ "address": addr }))
        .await;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    kernel.events.emit("kernel.stopping", Value::Null).await;
    info!("Sys API shutting down");

    Ok(())
}

#[derive(Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetParams {
    key: String,
    value: Value,
    #[serde(default)]
    expected_version: Option<u64>,
}

#[derive(Deserialize, Default)]
struct ListJobsParams {
    #[serde(default)]
    status: Option<JobStatus>,
}

fn params<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, MethodError> {
    serde_json::from_value(raw).map_err(|e| MethodError::invalid_params(e.to_string()))
}

/// `sys.ping`, `sys.echo`, `state.get`, `state.set` and `jobs.list`.
pub fn builtin_methods() -> RpcMethods {
    RpcMethods::new()
        .register("sys.ping", |kernel: Kernel, _params| async move {
            Ok(json!({
                "pong": true,
                "service": kernel.service_name(),
                "uptimeSeconds": kernel.identity.uptime_seconds(),
            }))
        })
        .register("sys.echo", |_kernel, params| async move { Ok(params) })
        .register("state.get", |kernel: Kernel, raw| async move {
            let KeyParams { key } = params(raw)?;
            let entry = kernel.state.get(&key).await?;
            Ok::<_, anyhow::Error>(serde_json::to_value(entry)?)
        })
        .register("state.set", |kernel: Kernel, raw| async move {
            let SetParams {
                key,
                value,
                expected_version,
            } = params(raw)?;
            match kernel.state.set(&key, value, expected_version).await {
                Ok(entry) => Ok::<_, anyhow::Error>(serde_json::to_value(entry)?),
                Err(e) if e.is_conflict() => Err(MethodError::new("VERSION_CONFLICT", e.to_string()).into()),
                Err(e) => Err(e.into()),
            }
        })
        .register("jobs.list", |kernel: Kernel, raw| async move {
            let ListJobsParams { status } = if raw.is_null() { ListJobsParams::default() } else { params(raw)? };
            let jobs = kernel.jobs.list_jobs(status).await?;
            Ok::<_, anyhow::Error>(serde_json::to_value(jobs)?)
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
