//! Built-in codecs
//!
//! - [`JsonProtocol`]: UTF-8 JSON, one object per message
//! - [`MsgPackProtocol`]: MessagePack with named fields (feature `msgpack`)

use async_trait::async_trait;
use bytes::Bytes;
use portway_core::Context;

use crate::protocol::{Protocol, ProtocolMessage};
use crate::{BridgeError, Result};

fn check_context(ctx: &Context) -> Result<()> {
    match ctx.err() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// JSON codec
#[derive(Debug, Clone)]
pub struct JsonProtocol {
    name: String,
}

impl JsonProtocol {
    pub const KIND: &'static str = "json";
    pub const VERSION: &'static str = "1.0";

    pub fn new() -> Self {
        Self::named(Self::KIND)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for JsonProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Protocol for JsonProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn version(&self) -> &str {
        Self::VERSION
    }

    async fn encode(&self, ctx: &Context, message: &ProtocolMessage) -> Result<Bytes> {
        check_context(ctx)?;
        Ok(Bytes::from(serde_json::to_vec(message)?))
    }

    async fn decode(&self, ctx: &Context, data: &[u8]) -> Result<ProtocolMessage> {
        check_context(ctx)?;
        if data.is_empty() {
            return Err(BridgeError::Codec("empty frame".into()));
        }
        Ok(serde_json::from_slice(data)?)
    }
}

/// MessagePack codec
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone)]
pub struct MsgPackProtocol {
    name: String,
}

#[cfg(feature = "msgpack")]
impl MsgPackProtocol {
    pub const KIND: &'static str = "msgpack";
    pub const VERSION: &'static str = "1.0";

    pub fn new() -> Self {
        Self::named(Self::KIND)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(feature = "msgpack")]
impl Default for MsgPackProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "msgpack")]
#[async_trait]
impl Protocol for MsgPackProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn version(&self) -> &str {
        Self::VERSION
    }

    async fn encode(&self, ctx: &Context, message: &ProtocolMessage) -> Result<Bytes> {
        check_context(ctx)?;
        Ok(Bytes::from(rmp_serde::to_vec_named(message)?))
    }

    async fn decode(&self, ctx: &Context, data: &[u8]) -> Result<ProtocolMessage> {
        check_context(ctx)?;
        if data.is_empty() {
            return Err(BridgeError::Codec("empty frame".into()));
        }
        Ok(rmp_serde::from_slice(data)?)
    }
}
