//! Error types for Portway core primitives

use thiserror::Error;

use crate::message::MessageStatus;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Message payload was empty when a value was requested
    #[error("empty payload")]
    EmptyPayload,

    /// Payload could not be serialized or deserialized
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Message failed validation
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Message status cannot move between these states
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Context deadline passed before the operation finished
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Context was cancelled before the operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// Message handler failed
    #[error("handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Returns true for the two context-termination errors
    pub fn is_context_error(&self) -> bool {
        matches!(self, Error::DeadlineExceeded | Error::Cancelled)
    }
}
