//! Call destinations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies the adapter/protocol pair a call or message is addressed to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeTarget {
    /// Registered adapter name
    pub adapter: String,
    /// Registered protocol name
    pub protocol: String,
    /// Remote service, if the adapter multiplexes several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Operation to invoke; overridden by the explicit operation passed to a call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Free-form per-call options
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, serde_json::Value>,
}

impl BridgeTarget {
    pub fn new(adapter: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Both the adapter and the protocol name are present
    pub fn is_complete(&self) -> bool {
        !self.adapter.is_empty() && !self.protocol.is_empty()
    }
}

impl std::fmt::Display for BridgeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.adapter, self.protocol)?;
        if let Some(service) = &self.service {
            write!(f, "/{}", service)?;
        }
        if let Some(operation) = &self.operation {
            write!(f, "#{}", operation)?;
        }
        Ok(())
    }
}
