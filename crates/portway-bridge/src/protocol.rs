//! Protocol contract
//!
//! A protocol is a wire-format codec that turns a [`ProtocolMessage`] into
//! adapter-transportable bytes and back. Implementations hold no
//! per-message state, so one instance serves any number of concurrent calls.

use async_trait::async_trait;
use bytes::Bytes;
use portway_core::{time, Context, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Result;

/// Logical message exchanged through a protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub id: String,
    /// Operation name for requests
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub timestamp: Timestamp,
}

impl ProtocolMessage {
    /// New message with a fresh id and the current time
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            headers: HashMap::new(),
            payload,
            metadata: HashMap::new(),
            timestamp: time::now(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Construction parameters handed to a protocol factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Instance name
    pub name: String,
    /// Factory type tag
    #[serde(rename = "type")]
    pub kind: String,
    pub options: HashMap<String, serde_json::Value>,
}

impl ProtocolConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            options: HashMap::new(),
        }
    }
}

/// Wire-format codec
#[async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;

    /// Protocol type tag (e.g. "json")
    fn kind(&self) -> &str;

    fn version(&self) -> &str;

    async fn initialize(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    async fn encode(&self, ctx: &Context, message: &ProtocolMessage) -> Result<Bytes>;

    async fn decode(&self, ctx: &Context, data: &[u8]) -> Result<ProtocolMessage>;
}
