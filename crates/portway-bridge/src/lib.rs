//! Portway Bridges
//!
//! Bridges heterogeneous services behind one message-passing abstraction:
//! - Adapter and protocol contracts ([`Adapter`], [`Protocol`]) with
//!   factory registries keyed by type tag
//! - [`Bridge`]: lifecycle state machine and the encode → send → decode call path
//! - [`BridgeManager`]: many bridges, shared factories, periodic health checks
//! - Heartbeat monitoring, auto-reconnect and an event bus per bridge
//! - [`ConnectionPool`]: bounded reuse of adapter connections
//! - Built-in JSON / MessagePack codecs and an in-memory adapter

pub mod adapter;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod factory;
mod health;
pub mod logging;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod protocol;
mod relay;

pub use adapter::{
    inbound_handler, Adapter, AdapterConfig, AdapterState, AdapterStats, AdapterStatus,
    InboundHandler,
};
pub use bridge::{Bridge, BridgeStatus};
pub use codec::JsonProtocol;
#[cfg(feature = "msgpack")]
pub use codec::MsgPackProtocol;
pub use config::{BridgeConfig, BridgeOptions, LogFormat, LoggingConfig, ManagerConfig};
pub use discovery::{BridgeAnnouncement, DiscoveryClient};
pub use error::{BridgeError, ErrorKind, Result};
pub use events::{event_handler, event_types, BridgeEvent, EventBus, EventHandler};
pub use factory::{
    json_protocol_factory, memory_adapter_factory, AdapterFactory, AdapterRegistry,
    FactoryRegistry, ProtocolFactory, ProtocolRegistry,
};
#[cfg(feature = "msgpack")]
pub use factory::msgpack_protocol_factory;
pub use logging::init_tracing;
pub use manager::{BridgeDescriptor, BridgeManager};
pub use memory::MemoryAdapter;
pub use metrics::{InMemoryMetrics, MetricsCollector};
pub use monitor::{BridgeHealth, HealthStatus};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use protocol::{Protocol, ProtocolConfig, ProtocolMessage};

pub use portway_core::{BridgeTarget, CancellationToken, Context};
