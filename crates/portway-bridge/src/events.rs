//! Bridge event bus
//!
//! Lifecycle transitions are published as [`BridgeEvent`]s. Every handler
//! registered for an event type runs as its own task under a timeout, so a
//! slow or failing handler never holds up the publisher or other handlers.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use portway_core::{time, CancellationToken, Context, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn, Instrument, Span};

use crate::{BridgeError, Result};

/// Event type names
pub mod event_types {
    pub const ADAPTER_CONNECTED: &str = "adapter.connected";
    pub const ADAPTER_DISCONNECTED: &str = "adapter.disconnected";
    pub const ADAPTER_RECONNECTED: &str = "adapter.reconnected";
    pub const ADAPTER_RECONNECT_FAILED: &str = "adapter.reconnect_failed";
    pub const BRIDGE_READY: &str = "bridge.ready";
    pub const BRIDGE_SHUTDOWN: &str = "bridge.shutdown";
}

/// Lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    /// Adapter or bridge the event concerns
    pub source: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl BridgeEvent {
    pub fn new(kind: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            timestamp: time::now(),
            data: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Async event handler
pub type EventHandler =
    Arc<dyn Fn(Context, BridgeEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`]
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Context, BridgeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, event| Box::pin(f(ctx, event)))
}

/// Counts running handler tasks and wakes waiters when none remain
#[derive(Debug, Default)]
struct TaskTracker {
    active: AtomicUsize,
    idle: Notify,
}

struct TaskGuard(Arc<TaskTracker>);

impl TaskTracker {
    fn begin(self: &Arc<Self>) -> TaskGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        TaskGuard(self.clone())
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Per-bridge event bus
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    token: CancellationToken,
    handler_timeout: Duration,
    permits: Arc<Semaphore>,
    tracker: Arc<TaskTracker>,
    log_events: bool,
    span: Span,
}

impl EventBus {
    /// `max_tasks` bounds concurrently running handlers
    pub fn new(handler_timeout: Duration, max_tasks: usize, log_events: bool) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            token: CancellationToken::new(),
            handler_timeout,
            permits: Arc::new(Semaphore::new(max_tasks.max(1))),
            tracker: Arc::new(TaskTracker::default()),
            log_events,
            span: Span::current(),
        }
    }

    pub(crate) fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn register(&self, kind: impl Into<String>, handler: EventHandler) {
        let kind = kind.into();
        debug!(parent: &self.span, event = %kind, "Registered event handler");
        self.handlers.write().entry(kind).or_default().push(handler);
    }

    /// Drop every handler for `kind`; returns how many were removed
    pub fn unregister(&self, kind: &str) -> usize {
        self.handlers
            .write()
            .remove(kind)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.read().get(kind).map(Vec::len).unwrap_or(0)
    }

    /// Handler tasks not yet finished
    pub fn pending_tasks(&self) -> usize {
        self.tracker.active.load(Ordering::SeqCst)
    }

    /// Dispatch `event` to its handlers; returns how many were started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn raise(&self, event: BridgeEvent) -> usize {
        if self.log_events {
            debug!(parent: &self.span, event = %event.kind, source = %event.source, "Event raised");
        }

        // Snapshot so no lock is held while handlers run
        let handlers = match self.handlers.read().get(&event.kind) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };
        if self.token.is_cancelled() {
            return 0;
        }

        for handler in &handlers {
            let guard = self.tracker.begin();
            let handler = handler.clone();
            let event = event.clone();
            let token = self.token.clone();
            let permits = self.permits.clone();
            let timeout = self.handler_timeout;

            let task = async move {
                let _guard = guard;
                let _permit = tokio::select! {
                    _ = token.cancelled() => return,
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let ctx = Context::with_token(token.child_token()).with_timeout(timeout);
                let kind = event.kind.clone();
                match ctx.run(handler(ctx.clone(), event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(event = %kind, error = %e, "Event handler failed"),
                    Err(e) => warn!(event = %kind, error = %e, "Event handler did not finish"),
                }
            };
            tokio::spawn(task.instrument(self.span.clone()));
        }

        handlers.len()
    }

    /// Wait until every spawned handler task has finished
    pub async fn wait_idle(&self, ctx: &Context) -> Result<()> {
        loop {
            let idle = self.tracker.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.tracker.active.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            tokio::select! {
                _ = ctx.done() => {
                    return Err(ctx.err().map(BridgeError::from).unwrap_or(BridgeError::Cancelled));
                }
                _ = &mut idle => {}
            }
        }
    }

    /// Cancel running handlers and refuse new events
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.handlers.read().len())
            .field("pending_tasks", &self.pending_tasks())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(counter: Arc<AtomicUsize>) -> EventHandler {
        event_handler(move |_ctx, _event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_every_handler_runs() {
        let bus = EventBus::new(Duration::from_secs(1), 4, true);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register(event_types::ADAPTER_CONNECTED, counting_handler(hits.clone()));
        bus.register(event_types::ADAPTER_CONNECTED, counting_handler(hits.clone()));
        bus.register(event_types::ADAPTER_DISCONNECTED, counting_handler(hits.clone()));

        let started = bus.raise(BridgeEvent::new(event_types::ADAPTER_CONNECTED, "grpc"));
        assert_eq!(started, 2);
        bus.wait_idle(&Context::background().with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_handlers_is_a_no_op() {
        let bus = EventBus::new(Duration::from_secs(1), 4, false);
        assert_eq!(bus.raise(BridgeEvent::new("unknown", "x")), 0);
        bus.wait_idle(&Context::background()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_is_timed_out() {
        let bus = EventBus::new(Duration::from_millis(50), 4, false);
        bus.register(
            "slow",
            event_handler(|_ctx, _event| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        );
        bus.raise(BridgeEvent::new("slow", "x"));
        bus.wait_idle(&Context::background().with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(bus.pending_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_honours_caller_deadline() {
        let bus = EventBus::new(Duration::from_secs(3600), 4, false);
        bus.register(
            "slow",
            event_handler(|_ctx, _event| async move {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(())
            }),
        );
        bus.raise(BridgeEvent::new("slow", "x"));
        let err = bus
            .wait_idle(&Context::background().with_timeout(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        bus.close();
        bus.wait_idle(&Context::background().with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregister() {
        let bus = EventBus::new(Duration::from_secs(1), 1, false);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register("e", counting_handler(hits.clone()));
        bus.register("e", counting_handler(hits));
        assert_eq!(bus.handler_count("e"), 2);
        assert_eq!(bus.unregister("e"), 2);
        assert_eq!(bus.handler_count("e"), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_drops_events() {
        let bus = EventBus::new(Duration::from_secs(1), 1, false);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register("e", counting_handler(hits.clone()));
        bus.close();
        assert_eq!(bus.raise(BridgeEvent::new("e", "x")), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
