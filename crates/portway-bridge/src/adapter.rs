//! Adapter contract
//!
//! An adapter is a transport binding (gRPC, REST, WebSocket, ...). It owns
//! its physical connection and reports its own status; the bridge only
//! drives it through this trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use portway_core::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{duration_ms, BridgeOptions};
use crate::Result;

/// Connection status as reported by the adapter itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    #[default]
    Initializing,
    Connected,
    Disconnected,
    Error,
}

impl AdapterStatus {
    /// Statuses the heartbeat monitor treats as a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, AdapterStatus::Disconnected | AdapterStatus::Error)
    }
}

impl std::fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AdapterStatus::Initializing => "initializing",
            AdapterStatus::Connected => "connected",
            AdapterStatus::Disconnected => "disconnected",
            AdapterStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Receives payloads arriving on an adapter
pub type InboundHandler = Arc<dyn Fn(Context, Bytes) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as an [`InboundHandler`]
pub fn inbound_handler<F, Fut>(f: F) -> InboundHandler
where
    F: Fn(Context, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, payload| Box::pin(f(ctx, payload)))
}

/// Transport binding
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Instance name
    fn name(&self) -> &str;

    /// Adapter type tag (e.g. "grpc", "memory")
    fn kind(&self) -> &str;

    fn status(&self) -> AdapterStatus;

    fn last_error(&self) -> Option<String>;

    /// Prepare resources; called once before the first connect
    async fn initialize(&self, ctx: &Context) -> Result<()>;

    async fn connect(&self, ctx: &Context) -> Result<()>;

    /// Disconnecting an already disconnected adapter succeeds
    async fn disconnect(&self, ctx: &Context) -> Result<()>;

    /// Release everything; the adapter is not used afterwards
    async fn shutdown(&self, ctx: &Context) -> Result<()> {
        self.disconnect(ctx).await
    }

    /// Send a payload and return the raw response. One-way transports
    /// return an empty buffer.
    async fn send(&self, ctx: &Context, payload: Bytes) -> Result<Bytes>;

    /// Install the handler for inbound payloads, replacing any previous one
    fn set_message_handler(&self, handler: InboundHandler);

    /// Traffic counters, if the adapter keeps them
    fn stats(&self) -> Option<AdapterStats> {
        None
    }
}

/// Snapshot of adapter traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub errors: u64,
    pub connects: u64,
    pub disconnects: u64,
}

/// Status, last error and counters shared by adapter implementations
#[derive(Debug, Default)]
pub struct AdapterState {
    status: RwLock<AdapterStatus>,
    last_error: RwLock<Option<String>>,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    errors: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
}

impl AdapterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AdapterStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: AdapterStatus) {
        *self.status.write() = status;
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Record a failure and move to [`AdapterStatus::Error`]
    pub fn record_error(&self, error: impl Into<String>) {
        *self.last_error.write() = Some(error.into());
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.set_status(AdapterStatus::Error);
    }

    pub fn record_connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        self.set_status(AdapterStatus::Connected);
    }

    pub fn record_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.set_status(AdapterStatus::Disconnected);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

const SENSITIVE_OPTIONS: &[&str] = &["password", "secret", "api_key", "token"];
const REDACTED: &str = "********";

/// Construction parameters handed to an adapter factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Instance name
    pub name: String,
    /// Factory type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Protocol the adapter is usually paired with
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub retry_count: u32,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    pub options: HashMap<String, serde_json::Value>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: String::new(),
            protocol: String::new(),
            host: "localhost".to_string(),
            port: 0,
            path: String::new(),
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            options: HashMap::new(),
        }
    }
}

impl AdapterConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Fill `buffer_size` and `compression` options the adapter was not
    /// given from the owning bridge's options. Adapters read them as hints;
    /// the bridge itself does not buffer or compress.
    pub fn inherit(&mut self, options: &BridgeOptions) {
        self.options
            .entry("buffer_size".to_string())
            .or_insert_with(|| serde_json::json!(options.buffer_size));
        self.options
            .entry("compression".to_string())
            .or_insert_with(|| serde_json::json!(options.enable_compression));
    }

    /// Copy with credential-like options masked, safe to log
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for (key, value) in copy.options.iter_mut() {
            let key = key.to_ascii_lowercase();
            if SENSITIVE_OPTIONS.iter().any(|s| key.contains(s)) {
                *value = serde_json::Value::String(REDACTED.to_string());
            }
        }
        copy
    }
}
