// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! RPC envelope exchanged with a peer's `POST /v1/sys/rpc` endpoint.

use serde::{Deserialize, Serialize};

pub const RPC_PATH: &str = "/v1/sys/rpc";
pub const IDENTITY_PATH: &str = "/v1/sys/identity";
pub const LOGS_PATH: &str = "/v1/sys/logs";

pub mod codes {
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Deadline the caller enforces, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RpcErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// `{result}` on success, `{error}` on failure. Both fields are optional on
/// the wire so that a peer answering `{}` decodes as a null result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: RpcErrorBody) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }
}
