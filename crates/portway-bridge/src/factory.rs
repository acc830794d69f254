//! Factory registries
//!
//! Factories build adapter and protocol instances from configuration, keyed
//! by a type tag such as `"memory"` or `"json"`. The tag is unrelated to the
//! instance name an adapter is registered under on a bridge.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::adapter::{Adapter, AdapterConfig};
use crate::codec::JsonProtocol;
use crate::memory::MemoryAdapter;
use crate::protocol::{Protocol, ProtocolConfig};
use crate::{BridgeError, Result};

/// Constructor for `T` from configuration `C`
pub type Factory<T, C> = Arc<dyn Fn(C) -> Result<Arc<T>> + Send + Sync>;

pub type AdapterFactory = Factory<dyn Adapter, AdapterConfig>;
pub type ProtocolFactory = Factory<dyn Protocol, ProtocolConfig>;

/// Configuration that names the factory it is meant for
pub trait FactoryConfig {
    fn factory_kind(&self) -> &str;
}

impl FactoryConfig for AdapterConfig {
    fn factory_kind(&self) -> &str {
        &self.kind
    }
}

impl FactoryConfig for ProtocolConfig {
    fn factory_kind(&self) -> &str {
        &self.kind
    }
}

/// Type-tag keyed factory table
pub struct FactoryRegistry<T: ?Sized, C> {
    label: &'static str,
    unknown: fn(String) -> BridgeError,
    factories: RwLock<HashMap<String, Factory<T, C>>>,
}

pub type AdapterRegistry = FactoryRegistry<dyn Adapter, AdapterConfig>;
pub type ProtocolRegistry = FactoryRegistry<dyn Protocol, ProtocolConfig>;

impl FactoryRegistry<dyn Adapter, AdapterConfig> {
    pub fn adapters() -> Self {
        Self::new("adapter factory", BridgeError::UnknownAdapterType)
    }
}

impl FactoryRegistry<dyn Protocol, ProtocolConfig> {
    pub fn protocols() -> Self {
        Self::new("protocol factory", BridgeError::UnknownProtocolType)
    }
}

impl<T: ?Sized, C: FactoryConfig> FactoryRegistry<T, C> {
    fn new(label: &'static str, unknown: fn(String) -> BridgeError) -> Self {
        Self {
            label,
            unknown,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register `factory` under `kind`; a kind can be registered once
    pub fn register(&self, kind: impl Into<String>, factory: Factory<T, C>) -> Result<()> {
        let kind = kind.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&kind) {
            return Err(BridgeError::already_registered(self.label, kind));
        }
        debug!(kind = %kind, "Registered {}", self.label);
        factories.insert(kind, factory);
        Ok(())
    }

    pub fn unregister(&self, kind: &str) -> bool {
        self.factories.write().remove(kind).is_some()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.read().contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Option<Factory<T, C>> {
        self.factories.read().get(kind).cloned()
    }

    /// Registered type tags, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build an instance with the factory named by `config`
    pub fn create(&self, config: C) -> Result<Arc<T>> {
        match self.get(config.factory_kind()) {
            Some(factory) => factory(config),
            None => Err((self.unknown)(config.factory_kind().to_string())),
        }
    }
}

impl<T: ?Sized, C> std::fmt::Debug for FactoryRegistry<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("label", &self.label)
            .field("kinds", &self.factories.read().len())
            .finish()
    }
}

/// Builds a [`MemoryAdapter`] named after the config
pub fn memory_adapter_factory() -> AdapterFactory {
    Arc::new(|config: AdapterConfig| -> Result<Arc<dyn Adapter>> {
        Ok(Arc::new(MemoryAdapter::new(config.name)))
    })
}

/// Builds a [`JsonProtocol`] named after the config
pub fn json_protocol_factory() -> ProtocolFactory {
    Arc::new(|config: ProtocolConfig| -> Result<Arc<dyn Protocol>> {
        Ok(Arc::new(JsonProtocol::named(config.name)))
    })
}

/// Builds a [`MsgPackProtocol`](crate::codec::MsgPackProtocol) named after the config
#[cfg(feature = "msgpack")]
pub fn msgpack_protocol_factory() -> ProtocolFactory {
    Arc::new(|config: ProtocolConfig| -> Result<Arc<dyn Protocol>> {
        Ok(Arc::new(crate::codec::MsgPackProtocol::named(config.name)))
    })
}
