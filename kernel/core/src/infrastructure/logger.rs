// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

//! Kernel Logger - leveled, buffered log sink
//!
//! Every call at or above the minimum level records a `LogEntry` in a bounded
//! FIFO buffer (exposed through `get_logs` for diagnostics) and writes one line
//! through `tracing`. Calls below it are dropped before either happens. The
//! subscriber that renders those lines is installed by the embedding binary.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::log::{LogEntry, LogLevel, LogQuery};
use crate::domain::repository::LogRepository;
use crate::infrastructure::repositories::InMemoryLogRepository;

#[derive(Clone)]
pub struct Logger {
    service: Arc<str>,
    context: Option<Arc<str>>,
    min_level: LogLevel,
    store: Arc<dyn LogRepository>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("service", &self.service)
            .field("context", &self.context)
            .field("min_level", &self.min_level)
            .field("buffered", &self.store.len())
            .finish()
    }
}

impl Logger {
    /// Logger backed by an in-memory ring buffer of `capacity` entries.
    pub fn new(service: impl Into<String>, capacity: usize) -> Self {
        Self::with_repository(service, Arc::new(InMemoryLogRepository::new(capacity)))
    }

    pub fn with_repository(service: impl Into<String>, store: Arc<dyn LogRepository>) -> Self {
        Self {
            service: Arc::from(service.into()),
            context: None,
            min_level: LogLevel::Debug,
            store,
        }
    }

    /// Drop entries less severe than `level`. Children inherit the threshold.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Logger sharing this buffer whose messages carry a fixed `[context]` prefix.
    pub fn child(&self, context: impl Into<String>) -> Self {
        Self {
            service: self.service.clone(),
            context: Some(Arc::from(context.into())),
            min_level: self.min_level,
            store: self.store.clone(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn debug(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.log(LogLevel::Debug, message.into(), metadata);
    }

    pub fn info(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.log(LogLevel::Info, message.into(), metadata);
    }

    pub fn warn(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.log(LogLevel::Warn, message.into(), metadata);
    }

    pub fn error(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.log(LogLevel::Error, message.into(), metadata);
    }

    /// Records at fatal severity. Does not terminate the process.
    pub fn fatal(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.log(LogLevel::Fatal, message.into(), metadata);
    }

    pub fn log(&self, level: LogLevel, message: String, metadata: serde_json::Value) {
        if !self.enabled(level) {
            return;
        }
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message,
            service: self.service.to_string(),
            context: self.context.as_deref().map(str::to_string),
            metadata,
        };
        emit_line(&entry);
        self.store.append(entry);
    }

    pub fn get_logs(&self, query: &LogQuery) -> Vec<LogEntry> {
        self.store.query(query)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

fn emit_line(entry: &LogEntry) {
    let line = match &entry.context {
        Some(ctx) => format!("[{ctx}] {}", entry.message),
        None => entry.message.clone(),
    };
    let service = entry.service.as_str();

    if entry.metadata.is_null() {
        match entry.level {
            LogLevel::Debug => debug!(service, "{line}"),
            LogLevel::Info => info!(service, "{line}"),
            LogLevel::Warn => warn!(service, "{line}"),
            LogLevel::Error => error!(service, "{line}"),
            LogLevel::Fatal => error!(service, fatal = true, "{line}"),
        }
    } else {
        let metadata = entry.metadata.to_string();
        match entry.level {
            LogLevel::Debug => debug!(service, %metadata, "{line}"),
            LogLevel::Info => info!(service, %metadata, "{line}"),
            LogLevel::Warn => warn!(service, %metadata, "{line}"),
            LogLevel::Error => error!(service, %metadata, "{line}"),
            LogLevel::Fatal => error!(service, %metadata, fatal = true, "{line}"),
        }
    }
}
