// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! In-memory implementations of the storage traits defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! - **InMemoryLogRepository** - Fixed-capacity FIFO ring buffer
//! - **InMemoryJobRepository** - HashMap-backed job records
//! - **InMemoryStateRepository** - Versioned key/value map with atomic compare-and-set
//!
//! Everything is process memory only and lost on restart.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::log::{LogEntry, LogQuery};
use crate::domain::repository::{
    CasOutcome, JobRepository, LogRepository, RepositoryError, StateRepository,
};
use crate::domain::state::StateEntry;

#[derive(Debug, Clone)]
pub struct InMemoryLogRepository {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl InMemoryLogRepository {
    /// A zero capacity is bumped to one so the buffer can hold the latest entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }
}

impl LogRepository for InMemoryLogRepository {
    fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        entries
            .iter()
            .rev()
            .filter(|e| query.level.map_or(true, |min| e.level >= min))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>, RepositoryError> {
        let jobs = self.jobs.read();
        let mut list: Vec<Job> = jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn delete_terminal(&self) -> Result<usize, RepositoryError> {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_terminal());
        Ok(before - jobs.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStateRepository {
    entries: Arc<Mutex<BTreeMap<String, StateEntry>>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateRepository for InMemoryStateRepository {
    async fn get(&self, key: &str) -> Result<Option<StateEntry>, RepositoryError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        value: serde_json::Value,
        expected: Option<u64>,
    ) -> Result<CasOutcome, RepositoryError> {
        // Check and write under one lock acquisition.
        let mut entries = self.entries.lock();
        let current = entries.get(key);
        let actual = current.map(|e| e.version).unwrap_or(0);
        if let Some(expected) = expected {
            if expected != actual {
                return Ok(CasOutcome::Conflict { actual });
            }
        }

        let entry = StateEntry::next(key, value, current);
        entries.insert(key.to_string(), entry.clone());
        Ok(CasOutcome::Written(entry))
    }

    async fn delete(&self, key: &str) -> Result<Option<StateEntry>, RepositoryError> {
        Ok(self.entries.lock().remove(key))
    }

    async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log::LogLevel;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn entry(level: LogLevel, message: &str) -> LogEntry {
        LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            service: "test".to_string(),
            context: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let repo = InMemoryLogRepository::new(3);
        for i in 0..5 {
            repo.append(entry(LogLevel::Info, &format!("m{i}")));
        }
        assert_eq!(repo.len(), 3);

        let all = repo.query(&LogQuery::default());
        let messages: Vec<_> = all.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m4", "m3", "m2"]);
    }

    #[test]
    fn test_query_level_and_pagination() {
        let repo = InMemoryLogRepository::new(10);
        repo.append(entry(LogLevel::Debug, "d"));
        repo.append(entry(LogLevel::Warn, "w1"));
        repo.append(entry(LogLevel::Error, "e"));
        repo.append(entry(LogLevel::Warn, "w2"));

        let warn_up = repo.query(&LogQuery::default().level(LogLevel::Warn));
        assert_eq!(warn_up.len(), 3);

        let page = repo.query(&LogQuery::default().limit(2).offset(1));
        let messages: Vec<_> = page.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["e", "w1"]);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let repo = InMemoryStateRepository::new();

        let first = repo.compare_and_set("k", json!(1), Some(0)).await.unwrap();
        assert!(matches!(first, CasOutcome::Written(ref e) if e.version == 1));

        let stale = repo.compare_and_set("k", json!(2), Some(0)).await.unwrap();
        assert_eq!(stale, CasOutcome::Conflict { actual: 1 });

        let forced = repo.compare_and_set("k", json!(3), None).await.unwrap();
        assert!(matches!(forced, CasOutcome::Written(ref e) if e.version == 2));

        assert_eq!(repo.get("k").await.unwrap().unwrap().value, json!(3));
    }

    #[tokio::test]
    async fn test_delete_terminal_jobs() {
        let repo = InMemoryJobRepository::new();
        let pending = Job::new("a", json!(null), None);
        let mut cancelled = Job::new("b", json!(null), None);
        cancelled.cancel().unwrap();
        repo.save(&pending).await.unwrap();
        repo.save(&cancelled).await.unwrap();

        assert_eq!(repo.delete_terminal().await.unwrap(), 1);
        assert!(repo.find_by_id(pending.id).await.unwrap().is_some());
        assert!(repo.find_by_id(cancelled.id).await.unwrap().is_none());
    }
}
