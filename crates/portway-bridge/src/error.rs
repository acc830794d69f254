//! Bridge error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Stable error identity, independent of message formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    State,
    Validation,
    Timeout,
    Cancelled,
    Init,
    Transport,
    Codec,
    Internal,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("protocol not found: {0}")]
    ProtocolNotFound(String),

    #[error("bridge not found: {0}")]
    BridgeNotFound(String),

    #[error("{kind} already registered: {name}")]
    AlreadyRegistered { kind: &'static str, name: String },

    #[error("bridge already exists: {0}")]
    BridgeAlreadyExists(String),

    #[error("bridge already running: {0}")]
    BridgeAlreadyRunning(String),

    #[error("bridge not initialized")]
    BridgeNotInitialized,

    #[error("bridge not running: {0}")]
    BridgeNotRunning(String),

    #[error("bridge is shutting down")]
    BridgeShuttingDown,

    #[error("bridge already initialized")]
    AlreadyInitialized,

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("operation timed out")]
    OperationTimeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("adapter {name} failed to initialize: {source}")]
    AdapterInitFailed {
        name: String,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("protocol {name} failed to initialize: {source}")]
    ProtocolInitFailed {
        name: String,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("bridge {id} failed to initialize: {source}")]
    BridgeInitFailed {
        id: String,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[source] Box<BridgeError>),

    #[error("failed to send message: {0}")]
    Send(#[source] Box<BridgeError>),

    #[error("failed to decode message: {0}")]
    Decode(#[source] Box<BridgeError>),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown adapter type: {0}")]
    UnknownAdapterType(String),

    #[error("unknown protocol type: {0}")]
    UnknownProtocolType(String),

    #[error(transparent)]
    Core(portway_core::Error),
}

impl BridgeError {
    /// Error identity; wrappers report the kind of their cause, except the
    /// initialization wrappers which always report [`ErrorKind::Init`]
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::AdapterNotFound(_)
            | BridgeError::ProtocolNotFound(_)
            | BridgeError::BridgeNotFound(_)
            | BridgeError::UnknownAdapterType(_)
            | BridgeError::UnknownProtocolType(_) => ErrorKind::NotFound,
            BridgeError::AlreadyRegistered { .. }
            | BridgeError::BridgeAlreadyExists(_)
            | BridgeError::BridgeAlreadyRunning(_) => ErrorKind::Conflict,
            BridgeError::BridgeNotInitialized
            | BridgeError::BridgeNotRunning(_)
            | BridgeError::BridgeShuttingDown
            | BridgeError::AlreadyInitialized
            | BridgeError::PoolClosed => ErrorKind::State,
            BridgeError::InvalidTarget(_)
            | BridgeError::InvalidMessage(_)
            | BridgeError::Config(_) => ErrorKind::Validation,
            BridgeError::OperationTimeout => ErrorKind::Timeout,
            BridgeError::Cancelled => ErrorKind::Cancelled,
            BridgeError::AdapterInitFailed { .. }
            | BridgeError::ProtocolInitFailed { .. }
            | BridgeError::BridgeInitFailed { .. } => ErrorKind::Init,
            BridgeError::Encode(inner) | BridgeError::Send(inner) | BridgeError::Decode(inner) => {
                inner.kind()
            }
            BridgeError::Transport(_) => ErrorKind::Transport,
            BridgeError::Codec(_) => ErrorKind::Codec,
            BridgeError::Core(err) => match err {
                portway_core::Error::EmptyPayload
                | portway_core::Error::InvalidMessage(_)
                | portway_core::Error::InvalidTransition { .. } => ErrorKind::Validation,
                portway_core::Error::Serialization(_) => ErrorKind::Codec,
                portway_core::Error::DeadlineExceeded => ErrorKind::Timeout,
                portway_core::Error::Cancelled => ErrorKind::Cancelled,
                portway_core::Error::Handler(_) => ErrorKind::Internal,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn already_registered(kind: &'static str, name: impl Into<String>) -> Self {
        BridgeError::AlreadyRegistered {
            kind,
            name: name.into(),
        }
    }
}

impl From<portway_core::Error> for BridgeError {
    fn from(err: portway_core::Error) -> Self {
        match err {
            portway_core::Error::DeadlineExceeded => BridgeError::OperationTimeout,
            portway_core::Error::Cancelled => BridgeError::Cancelled,
            other => BridgeError::Core(other),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

#[cfg(feature = "msgpack")]
impl From<rmp_serde::encode::Error> for BridgeError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

#[cfg(feature = "msgpack")]
impl From<rmp_serde::decode::Error> for BridgeError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}
