//! In-process adapter
//!
//! [`MemoryAdapter`] answers every `send` through a responder closure (echo
//! by default) and lets callers push inbound payloads with
//! [`MemoryAdapter::deliver`]. Useful for tests, benchmarks and wiring two
//! parts of one process together without a network hop.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use portway_core::Context;
use std::sync::Arc;
use tracing::debug;

use crate::adapter::{Adapter, AdapterState, AdapterStats, AdapterStatus, InboundHandler};
use crate::{BridgeError, Result};

/// Produces the response for a sent payload
pub type Responder = Arc<dyn Fn(Bytes) -> Result<Bytes> + Send + Sync>;

fn echo() -> Responder {
    Arc::new(|payload: Bytes| -> Result<Bytes> { Ok(payload) })
}

/// In-memory adapter
pub struct MemoryAdapter {
    name: String,
    state: AdapterState,
    responder: RwLock<Responder>,
    handler: RwLock<Option<InboundHandler>>,
}

impl MemoryAdapter {
    pub const KIND: &'static str = "memory";

    /// Create an echoing adapter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AdapterState::new(),
            responder: RwLock::new(echo()),
            handler: RwLock::new(None),
        }
    }

    /// Replace the echo responder
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(Bytes) -> Result<Bytes> + Send + Sync + 'static,
    {
        *self.responder.write() = Arc::new(responder);
        self
    }

    /// Force the reported status, e.g. to simulate a dropped connection
    pub fn set_status(&self, status: AdapterStatus) {
        self.state.set_status(status);
    }

    /// Simulate a transport failure
    pub fn fail(&self, error: impl Into<String>) {
        self.state.record_error(error);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Push an inbound payload into the installed handler
    pub async fn deliver(&self, ctx: &Context, payload: Bytes) -> Result<()> {
        let handler = self.handler.read().clone();
        self.state.record_received(payload.len());
        match handler {
            Some(handler) => handler(ctx.clone(), payload).await,
            None => {
                debug!(adapter = %self.name, "No inbound handler, dropping payload");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("name", &self.name)
            .field("status", &self.state.status())
            .finish()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
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

    async fn initialize(&self, ctx: &Context) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if self.state.status() == AdapterStatus::Initializing {
            self.state.set_status(AdapterStatus::Disconnected);
        }
        debug!(adapter = %self.name, "Memory adapter initialized");
        Ok(())
    }

    async fn connect(&self, ctx: &Context) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if self.state.status() != AdapterStatus::Connected {
            self.state.record_connected();
            debug!(adapter = %self.name, "Memory adapter connected");
        }
        Ok(())
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<()> {
        if self.state.status() == AdapterStatus::Connected {
            self.state.record_disconnected();
            debug!(adapter = %self.name, "Memory adapter disconnected");
        }
        Ok(())
    }

    async fn send(&self, ctx: &Context, payload: Bytes) -> Result<Bytes> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if self.state.status() != AdapterStatus::Connected {
            return Err(BridgeError::Transport(format!(
                "adapter {} is {}",
                self.name,
                self.state.status()
            )));
        }

        self.state.record_sent(payload.len());
        let responder = self.responder.read().clone();
        match responder(payload) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.state.record_error(e.to_string());
                Err(e)
            }
        }
    }

    fn set_message_handler(&self, handler: InboundHandler) {
        *self.handler.write() = Some(handler);
    }

    fn stats(&self) -> Option<AdapterStats> {
        Some(self.state.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::inbound_handler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lifecycle_is_idempotent() {
        let ctx = Context::background();
        let adapter = MemoryAdapter::new("mem");
        assert_eq!(adapter.status(), AdapterStatus::Initializing);

        adapter.initialize(&ctx).await.unwrap();
        assert_eq!(adapter.status(), AdapterStatus::Disconnected);
        adapter.disconnect(&ctx).await.unwrap();

        adapter.connect(&ctx).await.unwrap();
        adapter.connect(&ctx).await.unwrap();
        assert_eq!(adapter.stats().unwrap().connects, 1);

        adapter.disconnect(&ctx).await.unwrap();
        adapter.disconnect(&ctx).await.unwrap();
        assert_eq!(adapter.status(), AdapterStatus::Disconnected);
        assert_eq!(adapter.stats().unwrap().disconnects, 1);
    }

    #[tokio::test]
    async fn test_send_echoes_when_connected() {
        let ctx = Context::background();
        let adapter = MemoryAdapter::new("mem");
        assert!(adapter.send(&ctx, Bytes::from_static(b"x")).await.is_err());

        adapter.connect(&ctx).await.unwrap();
        let reply = adapter.send(&ctx, Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(reply.as_ref(), b"ping");
        assert_eq!(adapter.stats().unwrap().bytes_sent, 4);
    }

    #[tokio::test]
    async fn test_custom_responder_failure_marks_error() {
        let ctx = Context::background();
        let adapter = MemoryAdapter::new("mem")
            .with_responder(|_| Err(BridgeError::Transport("upstream closed".into())));
        adapter.connect(&ctx).await.unwrap();
        assert!(adapter.send(&ctx, Bytes::new()).await.is_err());
        assert_eq!(adapter.status(), AdapterStatus::Error);
        assert!(adapter.last_error().unwrap().contains("upstream closed"));
    }

    #[tokio::test]
    async fn test_deliver_reaches_handler() {
        let ctx = Context::background();
        let adapter = MemoryAdapter::new("mem");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        adapter.set_message_handler(inbound_handler(move |_ctx, payload: Bytes| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(payload.len(), Ordering::SeqCst);
                Ok(())
            }
        }));

        adapter.deliver(&ctx, Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(adapter.stats().unwrap().messages_received, 1);
    }
}
