// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Job Queue - named-handler task execution with lifecycle tracking
//!
//! Lifecycle: `pending → queued → running → completed | failed | cancelled`.
//!
//! - Jobs without a schedule are queued and spawned on the tokio runtime
//!   immediately.
//! - Jobs with a schedule are accepted and stored as `pending` but never run.
//!   Scheduling is not implemented; callers get a warning, not an error.
//! - Cancellation is advisory: the job is marked `cancelled` at once and its
//!   `CancellationToken` fires, but a handler that ignores the token keeps
//!   running. Its eventual result is discarded.
//! - Nothing is evicted automatically; call `clear_completed()`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::domain::job::{Job, JobFailure, JobId, JobStatus, JobTransitionError};
use crate::domain::repository::{JobRepository, RepositoryError};
use crate::infrastructure::panic::panic_message;
use crate::infrastructure::logger::Logger;
use crate::infrastructure::repositories::InMemoryJobRepository;

/// What a handler receives for one execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub name: String,
    pub params: serde_json::Value,
    /// Fires when the job is cancelled. Observing it is up to the handler.
    pub cancellation: CancellationToken,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

type JobHandler =
    Arc<dyn Fn(JobContext) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("No handler registered for job '{0}'")]
    HandlerNotFound(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: JobId, status: JobStatus },

    #[error("Timed out waiting for job {0}")]
    WaitTimeout(JobId),

    #[error(transparent)]
    Transition(#[from] JobTransitionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: RwLock<HashMap<String, JobHandler>>,
    repository: Arc<dyn JobRepository>,
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
    /// Serializes read-modify-write on job records.
    transitions: tokio::sync::Mutex<()>,
    /// Signalled whenever a job reaches a terminal status.
    settled: Notify,
    logger: Logger,
}

impl JobQueue {
    pub fn new(logger: Logger) -> Self {
        Self::with_repository(Arc::new(InMemoryJobRepository::new()), logger)
    }

    pub fn with_repository(repository: Arc<dyn JobRepository>, logger: Logger) -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                repository,
                tokens: Mutex::new(HashMap::new()),
                transitions: tokio::sync::Mutex::new(()),
                settled: Notify::new(),
                logger: logger.child("jobs"),
            }),
        }
    }

    /// Bind an executable to a job name, replacing any previous binding.
    pub fn register_handler<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let name = name.into();
        let handler: JobHandler = Arc::new(move |ctx: JobContext| Box::pin(handler(ctx)) as BoxFuture<'static, _>);
        if self.inner.handlers.write().insert(name.clone(), handler).is_some() {
            self.inner.logger.warn(
                format!("Replaced handler for job {name}"),
                serde_json::Value::Null,
            );
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.inner.handlers.read().contains_key(name)
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a job. Without a schedule it starts executing in the background
    /// and the returned snapshot is `queued`.
    pub async fn create_job(
        &self,
        name: &str,
        params: serde_json::Value,
        schedule: Option<String>,
    ) -> Result<Job, JobError> {
        let handler = self
            .inner
            .handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| JobError::HandlerNotFound(name.to_string()))?;

        let mut job = Job::new(name, params, schedule);

        if let Some(schedule) = &job.schedule {
            self.inner.repository.save(&job).await?;
            self.inner.logger.warn(
                format!("Job {name} has schedule '{schedule}'; scheduled execution is not supported, job stays pending"),
                json!({ "job_id": job.id }),
            );
            return Ok(job);
        }

        job.enqueue()?;
        let token = CancellationToken::new();
        self.inner.tokens.lock().insert(job.id, token.clone());
        self.inner.repository.save(&job).await?;

        self.inner.logger.debug(
            format!("Job {name} queued"),
            json!({ "job_id": job.id }),
        );

        let queue = self.clone();
        let id = job.id;
        tokio::spawn(async move {
            queue.execute(id, handler, token).await;
        });

        Ok(job)
    }

    async fn execute(&self, id: JobId, handler: JobHandler, token: CancellationToken) {
        let ctx = match self.transition(id, |job| job.start()).await {
            Ok(job) => JobContext {
                job_id: job.id,
                name: job.name,
                params: job.params,
                cancellation: token,
            },
            Err(e) => {
                self.inner.logger.debug(
                    format!("Job {id} not started: {e}"),
                    serde_json::Value::Null,
                );
                self.settle(id);
                return;
            }
        };
        let name = ctx.name.clone();

        let outcome = AssertUnwindSafe(async move { handler(ctx).await })
            .catch_unwind()
            .await;

        let finished = match outcome {
            Ok(Ok(value)) => self.transition(id, move |job| job.complete(value)).await,
            Ok(Err(e)) => {
                let failure = JobFailure::from_error(&e);
                self.transition(id, move |job| job.fail(failure)).await
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                let failure = JobFailure {
                    message: format!("Job handler panicked: {message}"),
                    stack: Some(message),
                };
                self.transition(id, move |job| job.fail(failure)).await
            }
        };

        match finished {
            Ok(job) => {
                metrics::counter!(
                    "kernel_jobs_total",
                    "name" => job.name.clone(),
                    "status" => job.status.as_str(),
                )
                .increment(1);
                match &job.error {
                    Some(failure) => self.inner.logger.error(
                        format!("Job {name} failed: {}", failure.message),
                        json!({ "job_id": id, "stack": failure.stack }),
                    ),
                    None => self.inner.logger.info(
                        format!("Job {name} completed"),
                        json!({ "job_id": id }),
                    ),
                }
            }
            Err(JobError::Transition(_)) => {
                self.inner.logger.info(
                    format!("Job {name} finished after cancellation; result discarded"),
                    json!({ "job_id": id }),
                );
            }
            Err(e) => {
                self.inner.logger.error(
                    format!("Failed to record outcome of job {name}: {e}"),
                    json!({ "job_id": id }),
                );
            }
        }

        self.settle(id);
    }

    /// Atomically load, mutate and store one job.
    async fn transition<F>(&self, id: JobId, mutate: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobTransitionError>,
    {
        let _guard = self.inner.transitions.lock().await;
        let mut job = self
            .inner
            .repository
            .find_by_id(id)
            .await?
            .ok_or(JobError::NotFound(id))?;
        mutate(&mut job)?;
        self.inner.repository.save(&job).await?;
        Ok(job)
    }

    fn settle(&self, id: JobId) {
        self.inner.tokens.lock().remove(&id);
        self.inner.settled.notify_waiters();
    }

    /// Mark a non-terminal job cancelled and fire its cancellation token.
    pub async fn cancel_job(&self, id: JobId) -> Result<Job, JobError> {
        let job = {
            let _guard = self.inner.transitions.lock().await;
            let mut job = self
                .inner
                .repository
                .find_by_id(id)
                .await?
                .ok_or(JobError::NotFound(id))?;
            if job.is_terminal() {
                return Err(JobError::AlreadyTerminal {
                    id,
                    status: job.status,
                });
            }
            job.cancel()?;
            self.inner.repository.save(&job).await?;
            job
        };

        if let Some(token) = self.inner.tokens.lock().get(&id) {
            token.cancel();
        }
        metrics::counter!(
            "kernel_jobs_total",
            "name" => job.name.clone(),
            "status" => job.status.as_str(),
        )
        .increment(1);
        self.inner.logger.info(
            format!("Job {} cancelled", job.name),
            json!({ "job_id": id }),
        );
        self.inner.settled.notify_waiters();
        Ok(job)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>, JobError> {
        Ok(self.inner.repository.find_by_id(id).await?)
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, JobError> {
        Ok(self.inner.repository.list(status).await?)
    }

    /// Wait until the job reaches a terminal status.
    pub async fn wait_for(&self, id: JobId, timeout: Duration) -> Result<Job, JobError> {
        let wait = async {
            loop {
                let notified = self.inner.settled.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let job = self.get_job(id).await?.ok_or(JobError::NotFound(id))?;
                if job.is_terminal() {
                    return Ok(job);
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| JobError::WaitTimeout(id))?
    }

    /// Remove every terminal job. Returns how many were removed.
    pub async fn clear_completed(&self) -> Result<usize, JobError> {
        let removed = {
            let _guard = self.inner.transitions.lock().await;
            self.inner.repository.delete_terminal().await?
        };
        if removed > 0 {
            self.inner.logger.debug(
                format!("Cleared {removed} finished jobs"),
                serde_json::Value::Null,
            );
        }
        Ok(removed)
    }
}
