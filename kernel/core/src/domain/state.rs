// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::repository::RepositoryError;

/// A versioned value. `version` starts at 1 and grows by exactly one per
/// successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl StateEntry {
    /// The entry that results from writing `value` over `previous`.
    pub fn next(key: &str, value: serde_json::Value, previous: Option<&StateEntry>) -> Self {
        Self {
            key: key.to_string(),
            value,
            version: previous.map(|p| p.version + 1).unwrap_or(1),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    /// The stored version differs from the one the writer expected. `actual`
    /// is 0 when the key does not exist.
    #[error("Version conflict on '{key}': expected version {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Value at '{key}' is not numeric")]
    NotNumeric { key: String },

    #[error("Counter at '{key}' overflowed")]
    Overflow { key: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl StateError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::VersionConflict { .. })
    }
}
