// Copyright (c) 2026 Constellation Platform
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - local publish/subscribe dispatch
//
// Handlers are registered per event name. `emit()` invokes every handler
// registered for the name concurrently and resolves once all of them settle.
// A failing or panicking handler is logged and contained; it never affects
// the other handlers or the emitter.
//
// In-memory only: events are not stored and cannot be replayed.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::json;

use crate::domain::events::{EmitReport, Event};
use crate::infrastructure::logger::Logger;
use crate::infrastructure::panic::panic_message;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

struct Registration {
    id: u64,
    once: bool,
    handler: Handler,
}

type HandlerTable = RwLock<HashMap<String, Vec<Registration>>>;

/// Event bus for publishing and subscribing to named events
#[derive(Clone)]
pub struct EventBus {
    source: Arc<str>,
    handlers: Arc<HandlerTable>,
    next_id: Arc<AtomicU64>,
    logger: Logger,
}

/// Handle returned by `on`/`once`. Dropping it keeps the handler registered;
/// call `unsubscribe` to remove it.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    id: u64,
    handlers: Weak<HandlerTable>,
}

impl Subscription {
    /// Remove the handler. Returns false if it was already gone (for example
    /// a `once` handler that has fired).
    pub fn unsubscribe(self) -> bool {
        let Some(handlers) = self.handlers.upgrade() else {
            return false;
        };
        let mut map = handlers.write();
        let Some(list) = map.get_mut(&self.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(&self.event);
        }
        removed
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl EventBus {
    /// `source` is stamped on every emitted event (normally the service name).
    pub fn new(source: impl Into<String>, logger: Logger) -> Self {
        Self {
            source: Arc::from(source.into()),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            logger: logger.child("events"),
        }
    }

    pub fn on<F, Fut>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name.into(), false, handler)
    }

    /// Like `on`, but the handler is removed before its first invocation.
    pub fn once<F, Fut>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name.into(), true, handler)
    }

    fn register<F, Fut>(&self, name: String, once: bool, handler: F) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler = Arc::new(move |event: Event| Box::pin(handler(event)) as HandlerFuture);

        self.handlers
            .write()
            .entry(name.clone())
            .or_default()
            .push(Registration { id, once, handler });

        Subscription {
            event: name,
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Dispatch an event to every handler registered for `name`.
    pub async fn emit(&self, name: &str, payload: serde_json::Value) -> EmitReport {
        let event = Event::new(name, self.source.as_ref(), payload);
        let handlers = self.take_handlers(name);

        metrics::counter!("kernel_events_emitted_total", "event" => name.to_string()).increment(1);

        if handlers.is_empty() {
            self.logger.debug(
                format!("No subscribers for event {name}"),
                json!({ "event_id": event.id }),
            );
            return EmitReport {
                event_id: event.id,
                delivered: 0,
                failed: 0,
            };
        }

        let dispatches = handlers.into_iter().map(|handler| {
            let event = event.clone();
            AssertUnwindSafe(async move { handler(event).await }).catch_unwind()
        });

        let mut delivered = 0;
        let mut failed = 0;
        for outcome in join_all(dispatches).await {
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    self.logger.error(
                        format!("Handler for event {name} failed: {e}"),
                        json!({ "event_id": event.id, "error": format!("{e:?}") }),
                    );
                }
                Err(panic) => {
                    failed += 1;
                    self.logger.error(
                        format!("Handler for event {name} panicked: {}", panic_message(&*panic)),
                        json!({ "event_id": event.id }),
                    );
                }
            }
        }

        EmitReport {
            event_id: event.id,
            delivered,
            failed,
        }
    }

    /// Snapshot the handlers for one dispatch, dropping `once` registrations.
    fn take_handlers(&self, name: &str) -> Vec<Handler> {
        let mut map = self.handlers.write();
        let (snapshot, now_empty) = match map.get_mut(name) {
            Some(list) => {
                let snapshot: Vec<Handler> = list.iter().map(|r| r.handler.clone()).collect();
                list.retain(|r| !r.once);
                (snapshot, list.is_empty())
            }
            None => (Vec::new(), false),
        };
        if now_empty {
            map.remove(name);
        }
        snapshot
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.handlers.read().get(name).map_or(0, Vec::len)
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop the handlers for one event, or for every event when `name` is `None`.
    pub fn remove_all(&self, name: Option<&str>) {
        let mut map = self.handlers.write();
        match name {
            Some(name) => {
                map.remove(name);
            }
            None => map.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log::{LogLevel, LogQuery};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn bus() -> (EventBus, Logger) {
        let logger = Logger::new("core", 100);
        (EventBus::new("core", logger.clone()), logger)
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let (bus, _) = bus();
        let report = bus.emit("nobody.listens", json!({})).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_handlers_receive_event() {
        let (bus, _) = bus();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = bus.on("user.created", move |event: Event| {
            let sink = sink.clone();
            async move {
                sink.lock().push((event.source.clone(), event.payload.clone()));
                Ok(())
            }
        });

        let report = bus.emit("user.created", json!({"id": 7})).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(seen.lock().as_slice(), &[("core".to_string(), json!({"id": 7}))]);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let (bus, logger) = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let _a = bus.on("deploy", move |_| {
            let h1 = h1.clone();
            async move {
                h1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let _b = bus.on("deploy", |_| async { anyhow::bail!("handler exploded") });
        let _c = bus.on("deploy", |_| async {
            if true {
                panic!("handler panicked");
            }
            Ok(())
        });
        let h2 = hits.clone();
        let _d = bus.on("deploy", move |_| {
            let h2 = h2.clone();
            async move {
                h2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let report = bus.emit("deploy", json!(null)).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let errors = logger.get_logs(&LogQuery::default().level(LogLevel::Error));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.message.contains("handler exploded")));
        assert!(errors.iter().any(|e| e.message.contains("handler panicked")));
    }

    #[tokio::test]
    async fn test_handlers_run_concurrently() {
        let (bus, _) = bus();
        for _ in 0..3 {
            let _ = bus.on("tick", |_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            });
        }

        let started = std::time::Instant::now();
        let report = bus.emit("tick", json!(null)).await;
        assert_eq!(report.delivered, 3);
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_once_fires_a_single_time() {
        let (bus, _) = bus();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = bus.once("ready", move |_| {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        bus.emit("ready", json!(null)).await;
        bus.emit("ready", json!(null)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("ready"), 0);
        assert!(!sub.unsubscribe());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (bus, _) = bus();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = bus.on("ping", move |_| {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        assert_eq!(bus.listener_count("ping"), 1);
        assert_eq!(bus.event_names(), vec!["ping".to_string()]);

        assert!(sub.unsubscribe());
        bus.emit("ping", json!(null)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(bus.event_names().is_empty());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let (bus, _) = bus();
        let _a = bus.on("a", |_| async { Ok(()) });
        let _b = bus.on("b", |_| async { Ok(()) });
        bus.remove_all(Some("a"));
        assert_eq!(bus.event_names(), vec!["b".to_string()]);
        bus.remove_all(None);
        assert!(bus.event_names().is_empty());
    }
}
