//! Message envelope
//!
//! A [`Message`] carries an opaque byte payload together with routing,
//! priority and lifecycle information. The id is assigned at construction
//! and cannot be changed afterwards. Requests and responses are linked only
//! through [`Message::correlation_id`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::target::BridgeTarget;
use crate::time::{self, Timestamp};

/// Message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Event,
    Heartbeat,
    Error,
    Metric,
    Control,
    Log,
    Subscribe,
    Unsubscribe,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Event => "event",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Error => "error",
            MessageType::Metric => "metric",
            MessageType::Control => "control",
            MessageType::Log => "log",
            MessageType::Subscribe => "subscribe",
            MessageType::Unsubscribe => "unsubscribe",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Processed,
    Failed,
    Rejected,
    TimedOut,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Processed => "processed",
            MessageStatus::Failed => "failed",
            MessageStatus::Rejected => "rejected",
            MessageStatus::TimedOut => "timed_out",
        }
    }

    /// No further transition is possible from a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::Processed
                | MessageStatus::Failed
                | MessageStatus::Rejected
                | MessageStatus::TimedOut
        )
    }

    fn step(&self) -> Option<u8> {
        match self {
            MessageStatus::Pending => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Processed => Some(3),
            _ => None,
        }
    }

    /// Forward along pending -> sent -> delivered -> processed, or a
    /// diversion to failed/rejected/timed_out from any non-terminal status
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.step(), next.step()) {
            (Some(current), Some(target)) => target > current,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message priority; higher sorts first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

/// Payload bytes as a standard base64 string; `null` reads as empty
mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

/// Bridge communication message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    status: MessageStatus,
    pub priority: MessagePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BridgeTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<BridgeTarget>,
    #[serde(with = "base64_payload", default)]
    payload: Bytes,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
}

impl Message {
    /// Create a message carrying a raw payload
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            status: MessageStatus::Pending,
            priority: MessagePriority::Normal,
            source: None,
            destination: None,
            payload: payload.into(),
            metadata: HashMap::new(),
            timestamp: time::now(),
            expiration: None,
            correlation_id: None,
            error: None,
            attempts: 0,
        }
    }

    /// Create a message whose payload is `value` encoded as JSON
    pub fn json<T: Serialize + ?Sized>(kind: MessageType, value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(kind, payload))
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source: BridgeTarget) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: BridgeTarget) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_metadata(key, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Move the message to `next`, rejecting backwards or post-terminal moves
    pub fn advance(&mut self, next: MessageStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Count one more delivery attempt
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn payload_bytes(&self) -> &Bytes {
        &self.payload
    }

    /// Replace the payload with `value` encoded as JSON
    pub fn set_payload<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.payload = Bytes::from(serde_json::to_vec(value)?);
        Ok(())
    }

    /// Replace the payload with raw bytes
    pub fn set_raw_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Decode the JSON payload
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        if self.payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn set_expiration(&mut self, ttl: Duration) {
        self.expiration = Some(time::after(ttl));
    }

    pub fn is_expired(&self) -> bool {
        self.expiration.is_some_and(|at| time::now() > at)
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Build a response linked to this message
    pub fn create_response<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Message> {
        let mut response = Message::json(MessageType::Response, payload)?;
        self.link_reply(&mut response);
        Ok(response)
    }

    /// Build an error reply linked to this message
    pub fn create_error_response(&self, error: impl Into<String>) -> Message {
        let mut response = Message::new(MessageType::Error, Bytes::new());
        response.error = Some(error.into());
        self.link_reply(&mut response);
        response
    }

    fn link_reply(&self, reply: &mut Message) {
        reply.correlation_id = Some(self.id.clone());
        reply.source = self.destination.clone();
        reply.destination = self.source.clone();
    }
}
