//! Message router
//!
//! Dispatches a message to the handler registered for its [`MessageType`],
//! falling back to a default handler. A message nobody handles is answered
//! with an error response instead of being dropped.

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Result;
use crate::message::{Message, MessageType};

/// Async message handler
pub type MessageHandler =
    Arc<dyn Fn(Context, Message) -> BoxFuture<'static, Result<Message>> + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`]
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    Arc::new(move |ctx, msg| Box::pin(f(ctx, msg)))
}

/// Dispatch table keyed by message type
#[derive(Default)]
pub struct MessageRouter {
    handlers: DashMap<MessageType, MessageHandler>,
    default_handler: RwLock<Option<MessageHandler>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `kind`, replacing any previous one
    pub fn register_handler<F, Fut>(&self, kind: MessageType, f: F)
    where
        F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message>> + Send + 'static,
    {
        self.handlers.insert(kind, handler(f));
    }

    /// Register the handler used when no type-specific handler matches
    pub fn register_default_handler<F, Fut>(&self, f: F)
    where
        F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message>> + Send + 'static,
    {
        *self.default_handler.write() = Some(handler(f));
    }

    /// Remove the handler for `kind`; returns whether one was registered
    pub fn unregister_handler(&self, kind: MessageType) -> bool {
        self.handlers.remove(&kind).is_some()
    }

    pub fn has_handler(&self, kind: MessageType) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Route `msg` to its handler and return the handler's reply
    pub async fn route(&self, ctx: &Context, msg: Message) -> Result<Message> {
        // Clone out of the table so no shard lock is held while the handler runs
        let handler = self
            .handlers
            .get(&msg.kind)
            .map(|entry| entry.value().clone())
            .or_else(|| self.default_handler.read().clone());

        match handler {
            Some(handler) => {
                debug!(id = %msg.id(), kind = %msg.kind, "Routing message");
                ctx.run(handler(ctx.clone(), msg)).await?
            }
            None => {
                warn!(id = %msg.id(), kind = %msg.kind, "No handler for message");
                let reply = msg.create_error_response(format!(
                    "no handler registered for message type: {}",
                    msg.kind
                ));
                Ok(reply)
            }
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("handlers", &self.handlers.len())
            .field("has_default", &self.default_handler.read().is_some())
            .finish()
    }
}
