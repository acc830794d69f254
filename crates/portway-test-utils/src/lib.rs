//! Common test helpers and utilities for Portway tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - An event collector for bridge event assertions
//! - A scriptable adapter with call counters and injectable failures
//! - A protocol wrapper that counts codec calls

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use portway_bridge::{
    event_handler, Adapter, AdapterState, AdapterStats, AdapterStatus, Bridge, BridgeError,
    BridgeEvent, EventHandler, InboundHandler, Protocol, ProtocolMessage,
};
use portway_core::Context;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if check().await {
            return true;
        }
        if start.elapsed() >= max_wait {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_for(
        || async { flag.load(Ordering::SeqCst) },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Event Collector
// ============================================================================

/// Collects bridge events with thread-safe access
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<BridgeEvent>>>,
    notify: Arc<Notify>,
    count: Arc<AtomicU32>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that records every event it receives
    pub fn handler(&self) -> EventHandler {
        let events = self.events.clone();
        let notify = self.notify.clone();
        let count = self.count.clone();

        event_handler(move |_ctx, event| {
            events.lock().push(event);
            count.fetch_add(1, Ordering::SeqCst);
            notify.notify_waiters();
            async { Ok(()) }
        })
    }

    /// Register on `bridge` for each of `kinds`
    pub fn attach(&self, bridge: &Bridge, kinds: &[&str]) {
        for kind in kinds {
            bridge.on_event(*kind, self.handler());
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().clone()
    }

    pub fn events_of(&self, kind: &str) -> Vec<BridgeEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Wait for at least n events in total
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    /// Wait for at least n events of one kind
    pub async fn wait_for_kind(&self, kind: &str, n: usize, max_wait: Duration) -> bool {
        wait_for(
            || async { self.count_of(kind) >= n },
            DEFAULT_CHECK_INTERVAL,
            max_wait,
        )
        .await
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

// ============================================================================
// Scripted Adapter
// ============================================================================

/// Adapter whose behaviour is programmed by the test
pub struct ScriptedAdapter {
    name: String,
    state: AdapterState,
    init_error: Mutex<Option<String>>,
    shutdown_error: Mutex<Option<String>>,
    send_error: Mutex<Option<String>>,
    send_delay: Mutex<Option<Duration>>,
    connect_delay: Mutex<Option<Duration>>,
    response: Mutex<Option<Bytes>>,
    connect_failures: AtomicU32,
    refuse_connects: AtomicBool,
    handler: Mutex<Option<InboundHandler>>,
    pub initialize_calls: AtomicU32,
    pub connect_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
    pub shutdown_calls: AtomicU32,
    pub send_calls: AtomicU32,
}

impl ScriptedAdapter {
    pub const KIND: &'static str = "scripted";

    /// Echoing adapter that succeeds at everything
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AdapterState::new(),
            init_error: Mutex::new(None),
            shutdown_error: Mutex::new(None),
            send_error: Mutex::new(None),
            send_delay: Mutex::new(None),
            connect_delay: Mutex::new(None),
            response: Mutex::new(None),
            connect_failures: AtomicU32::new(0),
            refuse_connects: AtomicBool::new(false),
            handler: Mutex::new(None),
            initialize_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            shutdown_calls: AtomicU32::new(0),
            send_calls: AtomicU32::new(0),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// `initialize` fails with this message
    pub fn failing_init(self, error: impl Into<String>) -> Self {
        *self.init_error.lock() = Some(error.into());
        self
    }

    /// `shutdown` fails with this message
    pub fn failing_shutdown(self, error: impl Into<String>) -> Self {
        *self.shutdown_error.lock() = Some(error.into());
        self
    }

    /// `send` fails with this message
    pub fn failing_send(self, error: impl Into<String>) -> Self {
        *self.send_error.lock() = Some(error.into());
        self
    }

    /// `send` sleeps before answering
    pub fn with_send_delay(self, delay: Duration) -> Self {
        *self.send_delay.lock() = Some(delay);
        self
    }

    /// `send` answers with fixed bytes instead of echoing
    pub fn with_response(self, response: impl Into<Bytes>) -> Self {
        *self.response.lock() = Some(response.into());
        self
    }

    /// Force the reported status
    pub fn set_status(&self, status: AdapterStatus) {
        self.state.set_status(status);
    }

    /// Later `connect` calls sleep before answering
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Fail the next `n` connect attempts
    pub fn fail_next_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every connect attempt until turned off
    pub fn refuse_connects(&self, refuse: bool) {
        self.refuse_connects.store(refuse, Ordering::SeqCst);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Push an inbound payload into the installed handler
    pub async fn deliver(&self, ctx: &Context, payload: Bytes) -> portway_bridge::Result<()> {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(ctx.clone(), payload).await,
            None => Ok(()),
        }
    }

    fn take_connect_failure(&self) -> bool {
        if self.refuse_connects.load(Ordering::SeqCst) {
            return true;
        }
        self.connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn status(&self) -> AdapterStatus {
        self.state.status()
    }

    fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }

    async fn initialize(&self, _ctx: &Context) -> portway_bridge::Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        let init_error = self.init_error.lock().clone();
        if let Some(error) = init_error {
            self.state.record_error(error.clone());
            return Err(BridgeError::Transport(error));
        }
        self.state.set_status(AdapterStatus::Disconnected);
        Ok(())
    }

    async fn connect(&self, _ctx: &Context) -> portway_bridge::Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_connect_failure() {
            self.state.record_error("connection refused");
            return Err(BridgeError::Transport("connection refused".into()));
        }
        self.state.record_connected();
        Ok(())
    }

    async fn disconnect(&self, _ctx: &Context) -> portway_bridge::Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.status() == AdapterStatus::Connected {
            self.state.record_disconnected();
        }
        Ok(())
    }

    async fn shutdown(&self, _ctx: &Context) -> portway_bridge::Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.state.set_status(AdapterStatus::Disconnected);
        let shutdown_error = self.shutdown_error.lock().clone();
        match shutdown_error {
            Some(error) => Err(BridgeError::Transport(error)),
            None => Ok(()),
        }
    }

    async fn send(&self, _ctx: &Context, payload: Bytes) -> portway_bridge::Result<Bytes> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.status() != AdapterStatus::Connected {
            return Err(BridgeError::Transport(format!("{} is not connected", self.name)));
        }
        let send_error = self.send_error.lock().clone();
        if let Some(error) = send_error {
            return Err(BridgeError::Transport(error));
        }
        self.state.record_sent(payload.len());
        let response = self.response.lock().clone();
        Ok(response.unwrap_or(payload))
    }

    fn set_message_handler(&self, handler: InboundHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn stats(&self) -> Option<AdapterStats> {
        Some(self.state.stats())
    }
}

// ============================================================================
// Counting Protocol
// ============================================================================

/// Protocol wrapper that counts codec calls
pub struct CountingProtocol {
    inner: Arc<dyn Protocol>,
    pub initialize_calls: AtomicU32,
    pub encode_calls: AtomicU32,
    pub decode_calls: AtomicU32,
}

impl CountingProtocol {
    pub fn new(inner: Arc<dyn Protocol>) -> Self {
        Self {
            inner,
            initialize_calls: AtomicU32::new(0),
            encode_calls: AtomicU32::new(0),
            decode_calls: AtomicU32::new(0),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Total encode and decode calls
    pub fn codec_calls(&self) -> u32 {
        self.encode_calls.load(Ordering::SeqCst) + self.decode_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Protocol for CountingProtocol {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn version(&self) -> &str {
        self.inner.version()
    }

    async fn initialize(&self, ctx: &Context) -> portway_bridge::Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.initialize(ctx).await
    }

    async fn encode(&self, ctx: &Context, message: &ProtocolMessage) -> portway_bridge::Result<Bytes> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(ctx, message).await
    }

    async fn decode(&self, ctx: &Context, data: &[u8]) -> portway_bridge::Result<ProtocolMessage> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(ctx, data).await
    }
}
