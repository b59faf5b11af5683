// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named notification delivered to local subscribers. Exists only for the
/// duration of one dispatch; events are neither stored nor replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the emitting service.
    pub source: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(name: impl Into<String>, source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Outcome of one `emit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitReport {
    pub event_id: Uuid,
    /// Handlers that ran to completion.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}
