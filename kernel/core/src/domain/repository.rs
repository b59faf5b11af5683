// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0
//! # Storage Interfaces
//!
//! Persistence contracts for the kernel's mutable state, one trait per
//! concern, implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Holds | Implementations |
//! |-------|-------|----------------|
//! | `LogRepository` | `LogEntry` ring buffer | `InMemoryLogRepository` |
//! | `JobRepository` | `Job` records | `InMemoryJobRepository` |
//! | `StateRepository` | `StateEntry` map | `InMemoryStateRepository` |
//!
//! The in-memory implementations lose everything on restart. A durable
//! backend only has to implement these traits; call sites in the
//! application layer stay unchanged.

use async_trait::async_trait;

use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::log::{LogEntry, LogQuery};
use crate::domain::state::StateEntry;

/// Bounded log storage. Synchronous: logging must never suspend the caller.
pub trait LogRepository: Send + Sync {
    /// Append an entry, evicting the oldest one when full.
    fn append(&self, entry: LogEntry);

    /// Newest-first page of entries matching the query.
    fn query(&self, query: &LogQuery) -> Vec<LogEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    fn clear(&self);
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Save job (create or update)
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    /// All jobs, optionally filtered by status, oldest first.
    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>, RepositoryError>;

    /// Remove every job in a terminal status. Returns how many were removed.
    async fn delete_terminal(&self) -> Result<usize, RepositoryError>;
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    Written(StateEntry),
    /// Nothing was written. `actual` is the stored version (0 if absent).
    Conflict { actual: u64 },
}

#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StateEntry>, RepositoryError>;

    /// Atomically write `value` if the stored version equals `expected`
    /// (0 meaning "absent"), or unconditionally when `expected` is `None`.
    /// The check and the write must not be separable by another writer.
    async fn compare_and_set(
        &self,
        key: &str,
        value: serde_json::Value,
        expected: Option<u64>,
    ) -> Result<CasOutcome, RepositoryError>;

    async fn delete(&self, key: &str) -> Result<Option<StateEntry>, RepositoryError>;

    /// All keys in lexical order.
    async fn keys(&self) -> Result<Vec<String>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
