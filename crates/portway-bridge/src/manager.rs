//! Bridge manager
//!
//! Owns any number of independently lifecycled bridges plus the adapter and
//! protocol factories used to build their components by type tag.

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use portway_core::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, AdapterConfig};
use crate::bridge::{Bridge, BridgeStatus};
use crate::config::{BridgeConfig, BridgeOptions, LoggingConfig, ManagerConfig};
use crate::discovery::DiscoveryClient;
use crate::factory::{
    json_protocol_factory, memory_adapter_factory, AdapterFactory, AdapterRegistry,
    ProtocolFactory, ProtocolRegistry,
};
use crate::logging::init_tracing;
use crate::metrics::MetricsCollector;
use crate::monitor::BridgeHealth;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::protocol::{Protocol, ProtocolConfig};
use crate::{BridgeError, Result};

/// Everything needed to build and initialize a bridge in one step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeDescriptor {
    /// Empty for a generated id
    pub id: String,
    /// Manager defaults when absent
    pub options: Option<BridgeOptions>,
    pub config: Option<BridgeConfig>,
    /// Built through the adapter factories, registered under `name`
    pub adapters: Vec<AdapterConfig>,
    /// Built through the protocol factories, registered under `name`
    pub protocols: Vec<ProtocolConfig>,
}

/// Holds an id while its bridge is being built
struct Reservation<'a> {
    reserved: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.reserved.lock().remove(&self.id);
    }
}

/// Owner of named bridges
pub struct BridgeManager {
    pub(crate) config: ManagerConfig,
    bridges: DashMap<String, Arc<Bridge>>,
    reserved: Mutex<HashSet<String>>,
    adapter_factories: AdapterRegistry,
    protocol_factories: ProtocolRegistry,
    pub(crate) metrics: Option<Arc<dyn MetricsCollector>>,
    discovery: Option<Arc<dyn DiscoveryClient>>,
    pub(crate) health: DashMap<String, BridgeHealth>,
    pub(crate) monitor: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            bridges: DashMap::new(),
            reserved: Mutex::new(HashSet::new()),
            adapter_factories: AdapterRegistry::adapters(),
            protocol_factories: ProtocolRegistry::protocols(),
            metrics: None,
            discovery: None,
            health: DashMap::new(),
            monitor: Mutex::new(None),
        }
    }

    /// Manager with the in-process factories registered: `memory`, `json`
    /// and (with the `msgpack` feature) `msgpack`
    pub fn with_builtin_factories(config: ManagerConfig) -> Result<Self> {
        let manager = Self::new(config);
        manager.register_adapter("memory", memory_adapter_factory())?;
        manager.register_protocol("json", json_protocol_factory())?;
        #[cfg(feature = "msgpack")]
        manager.register_protocol("msgpack", crate::factory::msgpack_protocol_factory())?;
        Ok(manager)
    }

    /// Collector shared by every bridge created afterwards
    pub fn with_metrics(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(collector);
        self
    }

    /// Discovery client shared by every bridge created afterwards
    pub fn with_discovery(mut self, client: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery = Some(client);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Install the global tracing subscriber at the default options' `log_level`
    pub fn init_logging(&self) -> Result<()> {
        init_tracing(&self.logging_config())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from(&self.config.default_options)
    }

    /// Register an adapter factory under a type tag
    pub fn register_adapter(&self, kind: impl Into<String>, factory: AdapterFactory) -> Result<()> {
        self.adapter_factories.register(kind, factory)
    }

    /// Register a protocol factory under a type tag
    pub fn register_protocol(
        &self,
        kind: impl Into<String>,
        factory: ProtocolFactory,
    ) -> Result<()> {
        self.protocol_factories.register(kind, factory)
    }

    pub fn adapter_factories(&self) -> &AdapterRegistry {
        &self.adapter_factories
    }

    pub fn protocol_factories(&self) -> &ProtocolRegistry {
        &self.protocol_factories
    }

    pub fn create_adapter(&self, config: AdapterConfig) -> Result<Arc<dyn Adapter>> {
        debug!(config = ?config.redacted(), "Creating adapter");
        self.adapter_factories.create(config)
    }

    pub fn create_protocol(&self, config: ProtocolConfig) -> Result<Arc<dyn Protocol>> {
        debug!(name = %config.name, kind = %config.kind, "Creating protocol");
        self.protocol_factories.create(config)
    }

    /// Pool of adapters built by the factory registered for `config.kind`
    pub fn create_pool(&self, config: AdapterConfig, pool: PoolConfig) -> Result<ConnectionPool> {
        let factory = self
            .adapter_factories
            .get(&config.kind)
            .ok_or_else(|| BridgeError::UnknownAdapterType(config.kind.clone()))?;
        ConnectionPool::new(factory, config, pool)
    }

    fn reserve(&self, id: &str) -> Result<Reservation<'_>> {
        let mut reserved = self.reserved.lock();
        if self.bridges.contains_key(id) || reserved.contains(id) {
            return Err(BridgeError::BridgeAlreadyExists(id.to_string()));
        }
        reserved.insert(id.to_string());
        Ok(Reservation {
            reserved: &self.reserved,
            id: id.to_string(),
        })
    }

    fn build(&self, id: &str, options: BridgeOptions, config: BridgeConfig) -> Result<Bridge> {
        options.validate()?;
        config.validate()?;
        let mut bridge = Bridge::new(id, options, config);
        if let Some(metrics) = &self.metrics {
            bridge = bridge.with_metrics(metrics.clone());
        }
        if let Some(discovery) = &self.discovery {
            bridge = bridge.with_discovery(discovery.clone());
        }
        Ok(bridge)
    }

    /// Create and initialize an empty bridge. An empty `id` gets a generated one.
    pub async fn create_bridge(
        &self,
        ctx: &Context,
        id: &str,
        options: Option<BridgeOptions>,
    ) -> Result<Arc<Bridge>> {
        self.create_bridge_from(
            ctx,
            BridgeDescriptor {
                id: id.to_string(),
                options,
                ..Default::default()
            },
        )
        .await
    }

    /// Build adapters and protocols through the factories, register them
    /// on a new bridge and initialize it. Nothing is stored on failure.
    pub async fn create_bridge_from(
        &self,
        ctx: &Context,
        descriptor: BridgeDescriptor,
    ) -> Result<Arc<Bridge>> {
        let id = if descriptor.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            descriptor.id
        };
        let reservation = self.reserve(&id)?;

        let options = descriptor
            .options
            .unwrap_or_else(|| self.config.default_options.clone());
        let config = descriptor
            .config
            .unwrap_or_else(|| self.config.default_config.clone());
        let bridge = Arc::new(self.build(&id, options, config)?);

        let init_failed = |source: BridgeError| BridgeError::BridgeInitFailed {
            id: id.clone(),
            source: Box::new(source),
        };

        for mut adapter_config in descriptor.adapters {
            adapter_config.inherit(bridge.options());
            let name = adapter_config.name.clone();
            let adapter = self.create_adapter(adapter_config).map_err(init_failed)?;
            bridge.register_adapter(name, adapter).map_err(init_failed)?;
        }
        for protocol_config in descriptor.protocols {
            let name = protocol_config.name.clone();
            let protocol = self.create_protocol(protocol_config).map_err(init_failed)?;
            bridge.register_protocol(name, protocol).map_err(init_failed)?;
        }

        if let Err(e) = bridge.initialize(ctx).await {
            if let Err(shutdown_err) = bridge.shutdown(ctx).await {
                debug!(bridge_id = %id, error = %shutdown_err, "Discarded bridge did not shut down cleanly");
            }
            return Err(init_failed(e));
        }

        self.health.insert(id.clone(), BridgeHealth::default());
        self.bridges.insert(id.clone(), bridge.clone());
        drop(reservation);
        info!(bridge_id = %id, "Created bridge");
        Ok(bridge)
    }

    /// Take ownership of a bridge built elsewhere, without initializing it
    pub fn add_bridge(&self, bridge: Arc<Bridge>) -> Result<()> {
        let reservation = self.reserve(bridge.id())?;
        self.health.insert(bridge.id().to_string(), BridgeHealth::default());
        self.bridges.insert(bridge.id().to_string(), bridge);
        drop(reservation);
        Ok(())
    }

    pub fn get_bridge(&self, id: &str) -> Result<Arc<Bridge>> {
        self.bridges
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))
    }

    /// Remove a bridge and shut it down; shutdown failures are only logged
    pub async fn remove_bridge(&self, ctx: &Context, id: &str) -> Result<()> {
        let (_, bridge) = self
            .bridges
            .remove(id)
            .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))?;
        self.health.remove(id);
        if let Err(e) = bridge.shutdown(ctx).await {
            warn!(bridge_id = %id, error = %e, "Bridge shutdown failed during removal");
        }
        info!(bridge_id = %id, "Removed bridge");
        Ok(())
    }

    /// Bridge ids, sorted
    pub fn list_bridges(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.bridges.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    pub fn statuses(&self) -> HashMap<String, BridgeStatus> {
        self.bridges
            .iter()
            .map(|e| (e.key().clone(), e.value().status()))
            .collect()
    }

    /// Initialize a bridge that is not running yet.
    ///
    /// A bridge in `Error` has already been started; it must be stopped and
    /// replaced, so it is reported as running.
    pub async fn start(&self, ctx: &Context, id: &str) -> Result<()> {
        let bridge = self.get_bridge(id)?;
        match bridge.status() {
            BridgeStatus::Ready | BridgeStatus::Initializing | BridgeStatus::Error => {
                Err(BridgeError::BridgeAlreadyRunning(id.to_string()))
            }
            BridgeStatus::ShuttingDown => Err(BridgeError::BridgeShuttingDown),
            BridgeStatus::Uninitialized => bridge.initialize(ctx).await,
        }
    }

    /// Shut a running bridge down, keeping it listed until removed
    pub async fn stop(&self, ctx: &Context, id: &str) -> Result<()> {
        let bridge = self.get_bridge(id)?;
        match bridge.status() {
            BridgeStatus::Ready | BridgeStatus::Initializing | BridgeStatus::Error => {
                bridge.shutdown(ctx).await
            }
            BridgeStatus::Uninitialized | BridgeStatus::ShuttingDown => {
                Err(BridgeError::BridgeNotRunning(id.to_string()))
            }
        }
    }

    /// Stop the health monitor, then remove and shut down every bridge,
    /// bounded by `shutdown_timeout`
    pub async fn shutdown_all(&self, ctx: &Context) -> Result<()> {
        self.stop_health_monitor();
        let ctx = ctx.with_timeout(self.config.shutdown_timeout);
        let ids = self.list_bridges();
        info!(bridges = ids.len(), "Shutting down all bridges");

        let results = join_all(ids.iter().map(|id| self.remove_bridge(&ctx, id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                debug!(bridge_id = %id, error = %e, "Bridge already removed");
            }
        }

        match ctx.err() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl Default for BridgeManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl std::fmt::Debug for BridgeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeManager")
            .field("bridges", &self.list_bridges())
            .field("adapter_kinds", &self.adapter_factories.kinds())
            .field("protocol_kinds", &self.protocol_factories.kinds())
            .finish()
    }
}
