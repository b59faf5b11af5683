// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! State Manager - versioned key/value store with optimistic concurrency
//!
//! A write may declare the version it expects; if the stored version differs
//! the write fails with `StateError::VersionConflict` and nothing changes.
//! The version check and the write happen in one `compare_and_set` call on the
//! repository, so they cannot be split by another writer even on a
//! multi-threaded runtime.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::repository::{CasOutcome, StateRepository};
use crate::domain::state::{StateEntry, StateError};
use crate::infrastructure::logger::Logger;
use crate::infrastructure::repositories::InMemoryStateRepository;

#[derive(Clone)]
pub struct StateManager {
    repository: Arc<dyn StateRepository>,
    logger: Logger,
}

impl StateManager {
    pub fn new(logger: Logger) -> Self {
        Self::with_repository(Arc::new(InMemoryStateRepository::new()), logger)
    }

    pub fn with_repository(repository: Arc<dyn StateRepository>, logger: Logger) -> Self {
        Self {
            repository,
            logger: logger.child("state"),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<StateEntry>, StateError> {
        Ok(self.repository.get(key).await?)
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, StateError> {
        Ok(self.get(key).await?.map(|e| e.value))
    }

    /// Write `value`. With `expected_version`, the write only happens if the
    /// stored version matches (`Some(0)` requires the key to be absent).
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> Result<StateEntry, StateError> {
        match self
            .repository
            .compare_and_set(key, value, expected_version)
            .await?
        {
            CasOutcome::Written(entry) => {
                self.logger.debug(
                    format!("State {key} written"),
                    json!({ "version": entry.version }),
                );
                Ok(entry)
            }
            CasOutcome::Conflict { actual } => {
                let expected = expected_version.unwrap_or_default();
                self.logger.warn(
                    format!("Version conflict on {key}"),
                    json!({ "expected": expected, "actual": actual }),
                );
                Err(StateError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    actual,
                })
            }
        }
    }

    /// Read-modify-write. The write is conditional on the version read, so a
    /// writer that slips in between read and write makes this call fail with
    /// a conflict instead of being overwritten.
    pub async fn update<F>(&self, key: &str, updater: F) -> Result<StateEntry, StateError>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let current = self.get(key).await?;
        let version = current.as_ref().map(|e| e.version).unwrap_or(0);
        let next = updater(current.as_ref().map(|e| &e.value));
        self.set(key, next, Some(version)).await
    }

    /// Add `by` to a numeric value; absent keys count as zero.
    pub async fn increment(&self, key: &str, by: i64) -> Result<StateEntry, StateError> {
        let current = self.get(key).await?;
        let version = current.as_ref().map(|e| e.version).unwrap_or(0);
        let next = match current.as_ref().map(|e| &e.value) {
            None | Some(Value::Null) => json!(by),
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    let sum = i.checked_add(by).ok_or_else(|| StateError::Overflow {
                        key: key.to_string(),
                    })?;
                    json!(sum)
                } else if let Some(f) = n.as_f64() {
                    json!(f + by as f64)
                } else {
                    return Err(StateError::NotNumeric {
                        key: key.to_string(),
                    });
                }
            }
            Some(_) => {
                return Err(StateError::NotNumeric {
                    key: key.to_string(),
                })
            }
        };
        self.set(key, next, Some(version)).await
    }

    pub async fn decrement(&self, key: &str, by: i64) -> Result<StateEntry, StateError> {
        let by = by.checked_neg().ok_or_else(|| StateError::Overflow {
            key: key.to_string(),
        })?;
        self.increment(key, by).await
    }

    /// Returns the removed entry, if any.
    pub async fn delete(&self, key: &str) -> Result<Option<StateEntry>, StateError> {
        Ok(self.repository.delete(key).await?)
    }

    pub async fn keys(&self) -> Result<Vec<String>, StateError> {
        Ok(self.repository.keys().await?)
    }
}
