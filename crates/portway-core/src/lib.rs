//! Portway Core
//!
//! Shared primitives for the Portway service gateway.
//!
//! This crate provides:
//! - The message envelope ([`Message`], [`MessageType`], [`MessageStatus`])
//! - Type-keyed message dispatch ([`MessageRouter`])
//! - Call destinations ([`BridgeTarget`])
//! - Deadlines and cancellation ([`Context`], [`CancellationToken`])
//! - Timing utilities ([`Timestamp`])

pub mod cancel;
pub mod context;
pub mod error;
pub mod message;
pub mod router;
pub mod target;
pub mod time;

pub use cancel::CancellationToken;
pub use context::Context;
pub use error::{Error, Result};
pub use message::{Message, MessagePriority, MessageStatus, MessageType};
pub use router::{MessageHandler, MessageRouter};
pub use target::BridgeTarget;
pub use time::Timestamp;
