//! Bridge: one coordinated set of adapters and protocols
//!
//! A bridge is created `Uninitialized`, moves through `Initializing` exactly
//! once and ends `Ready`. Shutdown is terminal: registries are cleared and a
//! new bridge must be built to continue.
//!
//! Adapters, protocols and lifecycle state sit behind three independent
//! locks. None of them is held across an `.await`, so a call in flight never
//! blocks registration or status reads.

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use portway_core::{BridgeTarget, CancellationToken, Context};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::adapter::{Adapter, AdapterStatus};
use crate::config::{BridgeConfig, BridgeOptions};
use crate::discovery::{BridgeAnnouncement, DiscoveryClient};
use crate::events::{event_types, BridgeEvent, EventBus, EventHandler};
use crate::metrics::{InMemoryMetrics, MetricsCollector, Tags};
use crate::protocol::{Protocol, ProtocolMessage};
use crate::{BridgeError, Result};

/// Bridge lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Error,
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BridgeStatus::Uninitialized => "uninitialized",
            BridgeStatus::Initializing => "initializing",
            BridgeStatus::Ready => "ready",
            BridgeStatus::ShuttingDown => "shutting_down",
            BridgeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

pub(crate) struct AdapterEntry {
    pub(crate) adapter: Arc<dyn Adapter>,
    /// Tracked by the bridge, independent of the adapter's own status
    pub(crate) connected: bool,
}

#[derive(Default)]
struct Lifecycle {
    status: BridgeStatus,
    errors: Vec<String>,
    /// Set once by `shutdown`; never cleared
    terminated: bool,
}

/// Run `fut` under `ctx`, folding context errors into [`BridgeError`]
pub(crate) async fn guarded<T, F>(ctx: &Context, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.run(fut).await?
}

/// Coordinator of one adapter/protocol set
pub struct Bridge {
    id: String,
    pub(crate) options: BridgeOptions,
    pub(crate) config: BridgeConfig,
    pub(crate) adapters: RwLock<HashMap<String, AdapterEntry>>,
    protocols: RwLock<HashMap<String, Arc<dyn Protocol>>>,
    lifecycle: RwLock<Lifecycle>,
    pub(crate) events: EventBus,
    pub(crate) root: CancellationToken,
    permits: Semaphore,
    metrics: Arc<dyn MetricsCollector>,
    discovery: Option<Arc<dyn DiscoveryClient>>,
    pub(crate) reconnecting: Mutex<HashSet<String>>,
    pub(crate) heartbeat: Mutex<Option<JoinHandle<()>>>,
    pub(crate) span: Span,
}

impl Bridge {
    /// Create an uninitialized bridge; an empty `id` gets a generated one
    pub fn new(id: impl Into<String>, options: BridgeOptions, config: BridgeConfig) -> Self {
        let mut id = id.into();
        if id.is_empty() {
            id = uuid::Uuid::new_v4().to_string();
        }
        let span = info_span!("bridge", bridge_id = %id);
        let events = EventBus::new(
            config.default_timeout,
            config.max_concurrent_tasks,
            config.enable_event_logging,
        )
        .with_span(span.clone());

        Self {
            permits: Semaphore::new(options.max_concurrency.max(1)),
            id,
            options,
            config,
            adapters: RwLock::new(HashMap::new()),
            protocols: RwLock::new(HashMap::new()),
            lifecycle: RwLock::new(Lifecycle::default()),
            events,
            root: CancellationToken::new(),
            metrics: Arc::new(InMemoryMetrics::new()),
            discovery: None,
            reconnecting: Mutex::new(HashSet::new()),
            heartbeat: Mutex::new(None),
            span,
        }
    }

    /// Replace the default in-memory metrics collector
    pub fn with_metrics(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = collector;
        self
    }

    /// Attach a discovery client, used when `enable_discovery` is set
    pub fn with_discovery(mut self, client: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery = Some(client);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<dyn MetricsCollector> {
        self.metrics.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register an event handler on this bridge's bus
    pub fn on_event(&self, kind: impl Into<String>, handler: EventHandler) {
        self.events.register(kind, handler);
    }

    pub fn status(&self) -> BridgeStatus {
        self.lifecycle.read().status
    }

    /// Most recent recorded failure
    pub fn last_error(&self) -> Option<String> {
        self.lifecycle.read().errors.last().cloned()
    }

    /// Every recorded initialization and connection failure, oldest first
    pub fn init_errors(&self) -> Vec<String> {
        self.lifecycle.read().errors.clone()
    }

    /// Move to `Error`. After shutdown the error is only recorded and the
    /// bridge stays `ShuttingDown`.
    pub fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.terminated {
            warn!(parent: &self.span, error = %error, "Error reported after shutdown");
        } else {
            error!(parent: &self.span, error = %error, "Bridge entered error state");
            lifecycle.status = BridgeStatus::Error;
        }
        lifecycle.errors.push(error);
    }

    fn record_error(&self, err: &BridgeError) {
        warn!(parent: &self.span, error = %err, "Recorded bridge error");
        self.lifecycle.write().errors.push(err.to_string());
    }

    /// Whether `shutdown` has started, whatever the current status says
    pub fn is_shut_down(&self) -> bool {
        self.lifecycle.read().terminated || self.root.is_cancelled()
    }

    /// Add an adapter under `name`; names are unique per bridge
    pub fn register_adapter(&self, name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Result<()> {
        let name = name.into();
        if self.is_shut_down() {
            return Err(BridgeError::BridgeShuttingDown);
        }
        let mut adapters = self.adapters.write();
        if adapters.contains_key(&name) {
            return Err(BridgeError::already_registered("adapter", name));
        }
        info!(parent: &self.span, adapter = %name, kind = %adapter.kind(), "Registered adapter");
        adapters.insert(
            name,
            AdapterEntry {
                adapter,
                connected: false,
            },
        );
        Ok(())
    }

    /// Add a protocol under `name`; names are unique per bridge
    pub fn register_protocol(
        &self,
        name: impl Into<String>,
        protocol: Arc<dyn Protocol>,
    ) -> Result<()> {
        let name = name.into();
        if self.is_shut_down() {
            return Err(BridgeError::BridgeShuttingDown);
        }
        let mut protocols = self.protocols.write();
        if protocols.contains_key(&name) {
            return Err(BridgeError::already_registered("protocol", name));
        }
        info!(
            parent: &self.span,
            protocol = %name,
            kind = %protocol.kind(),
            version = %protocol.version(),
            "Registered protocol"
        );
        protocols.insert(name, protocol);
        Ok(())
    }

    /// Remove an adapter, disconnecting it first if it is tracked as connected
    pub async fn unregister_adapter(&self, ctx: &Context, name: &str) -> Result<()> {
        let entry = self
            .adapters
            .write()
            .remove(name)
            .ok_or_else(|| BridgeError::AdapterNotFound(name.to_string()))?;

        if entry.connected {
            if let Err(e) = guarded(ctx, entry.adapter.disconnect(ctx)).await {
                warn!(parent: &self.span, adapter = %name, error = %e, "Disconnect on unregister failed");
            }
            self.events
                .raise(BridgeEvent::new(event_types::ADAPTER_DISCONNECTED, name));
        }
        info!(parent: &self.span, adapter = %name, "Unregistered adapter");
        Ok(())
    }

    pub fn unregister_protocol(&self, name: &str) -> Result<()> {
        self.protocols
            .write()
            .remove(name)
            .map(|_| info!(parent: &self.span, protocol = %name, "Unregistered protocol"))
            .ok_or_else(|| BridgeError::ProtocolNotFound(name.to_string()))
    }

    /// Registered adapter names, sorted
    pub fn list_adapters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered protocol names, sorted
    pub fn list_protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.protocols.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_adapter(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.read().get(name).map(|e| e.adapter.clone())
    }

    pub fn get_protocol(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        self.protocols.read().get(name).cloned()
    }

    /// Whether the bridge tracks `name` as connected
    pub fn is_connected(&self, name: &str) -> bool {
        self.adapters
            .read()
            .get(name)
            .map(|e| e.connected)
            .unwrap_or(false)
    }

    pub(crate) fn set_connected(&self, name: &str, connected: bool) {
        if let Some(entry) = self.adapters.write().get_mut(name) {
            entry.connected = connected;
        }
    }

    fn adapter_snapshot(&self) -> Vec<(String, Arc<dyn Adapter>)> {
        let mut adapters: Vec<_> = self
            .adapters
            .read()
            .iter()
            .map(|(name, e)| (name.clone(), e.adapter.clone()))
            .collect();
        adapters.sort_by(|a, b| a.0.cmp(&b.0));
        adapters
    }

    fn protocol_snapshot(&self) -> Vec<(String, Arc<dyn Protocol>)> {
        let mut protocols: Vec<_> = self
            .protocols
            .read()
            .iter()
            .map(|(name, p)| (name.clone(), p.clone()))
            .collect();
        protocols.sort_by(|a, b| a.0.cmp(&b.0));
        protocols
    }

    /// Initialize every registered adapter and protocol.
    ///
    /// Individual failures are recorded (see [`init_errors`](Self::init_errors))
    /// and do not stop the bridge from reaching `Ready`. Fails when the bridge
    /// was already initialized, when it is shut down concurrently (adapters
    /// connected by this run are disconnected again) or when
    /// [`set_error`](Self::set_error) was reported while it ran.
    pub async fn initialize(self: &Arc<Self>, ctx: &Context) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write();
            if lifecycle.status != BridgeStatus::Uninitialized {
                return Err(BridgeError::AlreadyInitialized);
            }
            lifecycle.status = BridgeStatus::Initializing;
        }

        self.run_initialize(ctx).instrument(self.span.clone()).await
    }

    async fn run_initialize(self: &Arc<Self>, ctx: &Context) -> Result<()> {
        info!(
            metrics = self.options.enable_metrics,
            discovery = self.options.enable_discovery && self.discovery.is_some(),
            "Initializing bridge"
        );

        let adapters = self.adapter_snapshot();
        let results = join_all(
            adapters
                .iter()
                .map(|(_, adapter)| self.until_shutdown(ctx, adapter.initialize(ctx))),
        )
        .await;
        if self.root.is_cancelled() {
            return Err(BridgeError::BridgeShuttingDown);
        }

        let mut initialized = Vec::new();
        for ((name, adapter), result) in adapters.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    debug!(adapter = %name, "Adapter initialized");
                    initialized.push((name, adapter));
                }
                Err(e) => self.record_error(&BridgeError::AdapterInitFailed {
                    name,
                    source: Box::new(e),
                }),
            }
        }

        let protocols = self.protocol_snapshot();
        let results = join_all(
            protocols
                .iter()
                .map(|(_, protocol)| self.until_shutdown(ctx, protocol.initialize(ctx))),
        )
        .await;
        if self.root.is_cancelled() {
            return Err(BridgeError::BridgeShuttingDown);
        }
        for ((name, _), result) in protocols.into_iter().zip(results) {
            if let Err(e) = result {
                self.record_error(&BridgeError::ProtocolInitFailed {
                    name,
                    source: Box::new(e),
                });
            }
        }

        let connected = if self.config.connect_on_initialize {
            self.connect_initialized(ctx, &initialized).await
        } else {
            Vec::new()
        };

        let outcome = {
            let mut lifecycle = self.lifecycle.write();
            if lifecycle.terminated {
                Err(BridgeError::BridgeShuttingDown)
            } else if lifecycle.status == BridgeStatus::Error {
                let reason = lifecycle.errors.last().cloned().unwrap_or_default();
                Err(BridgeError::BridgeInitFailed {
                    id: self.id.clone(),
                    source: Box::new(BridgeError::Transport(reason)),
                })
            } else {
                lifecycle.status = BridgeStatus::Ready;
                Ok(())
            }
        };
        if let Err(e) = outcome {
            if matches!(e, BridgeError::BridgeShuttingDown) {
                self.release(&connected).await;
            }
            warn!(error = %e, "Initialization abandoned");
            return Err(e);
        }

        self.start_heartbeat();
        self.announce(ctx).await;

        let failures = self.lifecycle.read().errors.len();
        info!(
            adapters = self.adapters.read().len(),
            protocols = self.protocols.read().len(),
            failures,
            "Bridge ready"
        );
        self.events.raise(
            BridgeEvent::new(event_types::BRIDGE_READY, self.id.as_str())
                .with_data(serde_json::json!({ "failures": failures })),
        );
        Ok(())
    }

    /// Run `fut` under `ctx`, abandoning it as soon as shutdown starts
    async fn until_shutdown<T, F>(&self, ctx: &Context, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.root.cancelled() => Err(BridgeError::BridgeShuttingDown),
            result = guarded(ctx, fut) => result,
        }
    }

    /// Connect freshly initialized adapters. Returns every adapter whose
    /// connect succeeded, including those that finished after shutdown began.
    async fn connect_initialized(
        &self,
        ctx: &Context,
        initialized: &[(String, Arc<dyn Adapter>)],
    ) -> Vec<(String, Arc<dyn Adapter>)> {
        let results = join_all(
            initialized
                .iter()
                .map(|(_, adapter)| self.until_shutdown(ctx, adapter.connect(ctx))),
        )
        .await;

        let mut connected = Vec::new();
        for ((name, adapter), result) in initialized.iter().zip(results) {
            match result {
                Ok(()) => {
                    connected.push((name.clone(), adapter.clone()));
                    if self.is_shut_down() {
                        continue;
                    }
                    self.set_connected(name, true);
                    self.events
                        .raise(BridgeEvent::new(event_types::ADAPTER_CONNECTED, name.as_str()));
                }
                Err(_) if self.is_shut_down() => {}
                Err(e) => self.record_error(&BridgeError::AdapterInitFailed {
                    name: name.clone(),
                    source: Box::new(e),
                }),
            }
        }
        connected
    }

    /// Disconnect adapters connected by an initialization that lost the race
    /// with shutdown. The caller's context may already be done, so these get
    /// their own deadline.
    async fn release(&self, connected: &[(String, Arc<dyn Adapter>)]) {
        if connected.is_empty() {
            return;
        }
        let ctx = Context::background().with_timeout(self.config.default_timeout);
        let results = join_all(
            connected
                .iter()
                .map(|(_, adapter)| guarded(&ctx, adapter.disconnect(&ctx))),
        )
        .await;
        for ((name, _), result) in connected.iter().zip(results) {
            match result {
                Ok(()) => debug!(adapter = %name, "Released adapter connected during shutdown"),
                Err(e) => warn!(adapter = %name, error = %e, "Release after shutdown failed"),
            }
        }
    }

    async fn announce(&self, ctx: &Context) {
        let Some(discovery) = self.discovery.as_ref().filter(|_| self.options.enable_discovery)
        else {
            return;
        };
        let announcement = BridgeAnnouncement {
            bridge_id: self.id.clone(),
            name: self.config.name.clone(),
            adapters: self.list_adapters(),
            protocols: self.list_protocols(),
        };
        if let Err(e) = guarded(ctx, discovery.announce(ctx, &announcement)).await {
            warn!(error = %e, "Discovery announce failed");
        }
    }

    /// Connect an adapter, initializing it first if it never was
    pub async fn connect_adapter(&self, ctx: &Context, name: &str) -> Result<()> {
        if self.is_shut_down() {
            return Err(BridgeError::BridgeShuttingDown);
        }
        let adapter = self
            .get_adapter(name)
            .ok_or_else(|| BridgeError::AdapterNotFound(name.to_string()))?;

        if adapter.status() == AdapterStatus::Initializing {
            guarded(ctx, adapter.initialize(ctx))
                .await
                .map_err(|e| BridgeError::AdapterInitFailed {
                    name: name.to_string(),
                    source: Box::new(e),
                })?;
        }
        guarded(ctx, adapter.connect(ctx)).await?;

        self.set_connected(name, true);
        info!(parent: &self.span, adapter = %name, "Adapter connected");
        self.events
            .raise(BridgeEvent::new(event_types::ADAPTER_CONNECTED, name));
        Ok(())
    }

    /// Disconnect an adapter and stop tracking it
    pub async fn disconnect_adapter(&self, ctx: &Context, name: &str) -> Result<()> {
        let adapter = self
            .get_adapter(name)
            .ok_or_else(|| BridgeError::AdapterNotFound(name.to_string()))?;

        guarded(ctx, adapter.disconnect(ctx)).await?;

        self.set_connected(name, false);
        info!(parent: &self.span, adapter = %name, "Adapter disconnected");
        self.events
            .raise(BridgeEvent::new(event_types::ADAPTER_DISCONNECTED, name));
        Ok(())
    }

    /// Route one request: encode, send, decode.
    ///
    /// `operation` overrides `target.operation` when non-empty. The bridge's
    /// default timeout applies only when `ctx` carries no deadline.
    pub async fn call(
        &self,
        ctx: &Context,
        target: &BridgeTarget,
        operation: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match self.status() {
            BridgeStatus::Ready => {}
            BridgeStatus::ShuttingDown => return Err(BridgeError::BridgeShuttingDown),
            _ => return Err(BridgeError::BridgeNotInitialized),
        }
        if target.adapter.is_empty() {
            return Err(BridgeError::InvalidTarget("adapter name is empty".into()));
        }
        if target.protocol.is_empty() {
            return Err(BridgeError::InvalidTarget("protocol name is empty".into()));
        }
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let call_ctx = if ctx.has_deadline() {
            ctx.clone()
        } else {
            ctx.with_timeout(self.options.default_timeout)
        };

        tokio::select! {
            biased;
            _ = self.root.cancelled() => Err(BridgeError::BridgeShuttingDown),
            result = self.dispatch(&call_ctx, target, operation, data) => result,
        }
    }

    async fn dispatch(
        &self,
        ctx: &Context,
        target: &BridgeTarget,
        operation: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let _permit = ctx
            .run(self.permits.acquire())
            .await?
            .map_err(|_| BridgeError::BridgeShuttingDown)?;

        let protocol = self
            .get_protocol(&target.protocol)
            .ok_or_else(|| BridgeError::ProtocolNotFound(target.protocol.clone()))?;
        let adapter = self
            .get_adapter(&target.adapter)
            .ok_or_else(|| BridgeError::AdapterNotFound(target.adapter.clone()))?;

        let operation = if operation.is_empty() {
            target.operation.as_deref().unwrap_or_default()
        } else {
            operation
        };

        let mut request = ProtocolMessage::new(operation, data);
        if let Some(service) = &target.service {
            request.headers.insert("service".to_string(), service.clone());
        }
        for (key, value) in &target.options {
            request.metadata.insert(key.clone(), value.to_string());
        }

        let mut tags = Tags::new();
        tags.insert("adapter".to_string(), target.adapter.clone());
        tags.insert("protocol".to_string(), target.protocol.clone());
        tags.insert("operation".to_string(), operation.to_string());

        debug!(
            parent: &self.span,
            id = %request.id,
            target = %target,
            operation = %operation,
            "Dispatching call"
        );

        let encoded: Bytes = guarded(ctx, protocol.encode(ctx, &request))
            .await
            .map_err(|e| self.call_failed(&tags, BridgeError::Encode(Box::new(e))))?;

        let started = Instant::now();
        let sent = guarded(ctx, adapter.send(ctx, encoded)).await;
        if self.options.enable_metrics {
            self.metrics.collect(
                "bridge",
                "request_duration",
                started.elapsed().as_secs_f64(),
                &tags,
            );
        }
        let raw = sent.map_err(|e| self.call_failed(&tags, BridgeError::Send(Box::new(e))))?;

        let response = guarded(ctx, protocol.decode(ctx, &raw))
            .await
            .map_err(|e| self.call_failed(&tags, BridgeError::Decode(Box::new(e))))?;

        Ok(response.payload)
    }

    fn call_failed(&self, tags: &Tags, err: BridgeError) -> BridgeError {
        if self.options.enable_metrics {
            self.metrics.inc_counter("errors", tags);
        }
        debug!(parent: &self.span, error = %err, "Call failed");
        err
    }

    /// Tear the bridge down. Idempotent.
    ///
    /// Adapter shutdown failures are logged, never returned. Returns the
    /// context's error if `ctx` ends before running event handlers finish.
    pub async fn shutdown(&self, ctx: &Context) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write();
            if lifecycle.terminated {
                return Ok(());
            }
            lifecycle.terminated = true;
            lifecycle.status = BridgeStatus::ShuttingDown;
        }

        self.run_shutdown(ctx).instrument(self.span.clone()).await
    }

    async fn run_shutdown(&self, ctx: &Context) -> Result<()> {
        info!("Shutting down bridge");
        self.root.cancel();
        self.permits.close();
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            heartbeat.abort();
        }

        let adapters: Vec<(String, AdapterEntry)> = self.adapters.write().drain().collect();
        let results = join_all(
            adapters
                .iter()
                .map(|(_, entry)| guarded(ctx, entry.adapter.shutdown(ctx))),
        )
        .await;
        for ((name, _), result) in adapters.iter().zip(results) {
            if let Err(e) = result {
                warn!(adapter = %name, error = %e, "Adapter shutdown failed");
            }
        }
        self.protocols.write().clear();
        self.reconnecting.lock().clear();

        if let Some(discovery) = self.discovery.as_ref().filter(|_| self.options.enable_discovery) {
            if let Err(e) = guarded(ctx, discovery.withdraw(ctx, &self.id)).await {
                warn!(error = %e, "Discovery withdraw failed");
            }
        }

        self.events
            .raise(BridgeEvent::new(event_types::BRIDGE_SHUTDOWN, self.id.as_str()));
        let drained = self.events.wait_idle(ctx).await;
        self.events.close();

        match drained {
            Ok(()) => {
                info!(adapters = adapters.len(), "Bridge shut down");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Event handlers still running at shutdown");
                Err(e)
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("adapters", &self.list_adapters())
            .field("protocols", &self.list_protocols())
            .finish()
    }
}
