// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    /// Full cause chain (or panic payload) of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl JobFailure {
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            stack: Some(format!("{err:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobTransitionError {
    #[error("Job {id} cannot move from {from} to {to}")]
    Invalid {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

impl Job {
    pub fn new(name: impl Into<String>, params: serde_json::Value, schedule: Option<String>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            params,
            schedule,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn enqueue(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Pending, JobStatus::Queued)
    }

    pub fn start(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Queued, JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Running, JobStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, failure: JobFailure) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Running, JobStatus::Failed)?;
        self.error = Some(failure);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Valid from any non-terminal status.
    pub fn cancel(&mut self) -> Result<(), JobTransitionError> {
        if self.is_terminal() {
            return Err(JobTransitionError::Invalid {
                id: self.id,
                from: self.status,
                to: JobStatus::Cancelled,
            });
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), JobTransitionError> {
        if self.status != from {
            return Err(JobTransitionError::Invalid {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
