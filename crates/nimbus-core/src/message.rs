use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReceiptHandleError;

/// Attribute attached by the retry engine naming the queue a dead-lettered
/// message came from.
pub const ORIGINAL_QUEUE_ATTRIBUTE: &str = "originalQueue";

/// Attribute carrying the most recent delivery failure reason.
pub const LAST_ERROR_ATTRIBUTE: &str = "lastError";

/// Message payload. Bodies are opaque to the broker; the variant only
/// records how the producer encoded them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    Json(serde_json::Value),
    Binary(Vec<u8>),
}

impl MessageBody {
    /// Size of the encoded body in bytes, checked against the queue's
    /// `max_message_size`.
    pub fn size(&self) -> usize {
        match self {
            MessageBody::Text(s) => s.len(),
            MessageBody::Json(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
            MessageBody::Binary(b) => b.len(),
        }
    }
}

impl From<&str> for MessageBody {
    fn from(value: &str) -> Self {
        MessageBody::Text(value.to_string())
    }
}

impl From<String> for MessageBody {
    fn from(value: String) -> Self {
        MessageBody::Text(value)
    }
}

impl From<Vec<u8>> for MessageBody {
    fn from(value: Vec<u8>) -> Self {
        MessageBody::Binary(value)
    }
}

impl From<serde_json::Value> for MessageBody {
    fn from(value: serde_json::Value) -> Self {
        MessageBody::Json(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Binary(Vec<u8>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

pub type Attributes = HashMap<String, AttributeValue>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageStatus {
    Buffered,
    InFlight,
    Acknowledged,
    DeadLettered,
    /// Dropped by the retention sweep or by purge/delete.
    Discarded,
}

/// One-time token identifying a single delivery of a message. A new lease
/// id is minted on every delivery, so a handle from an earlier delivery
/// never matches the current lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle {
    pub message_id: Uuid,
    pub lease_id: Uuid,
}

impl ReceiptHandle {
    pub fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            lease_id: Uuid::now_v7(),
        }
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.message_id.simple(), self.lease_id.simple())
    }
}

impl FromStr for ReceiptHandle {
    type Err = ReceiptHandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (msg, lease) = s
            .split_once('.')
            .ok_or_else(|| ReceiptHandleError::Malformed(s.to_string()))?;
        let message_id =
            Uuid::parse_str(msg).map_err(|_| ReceiptHandleError::Malformed(s.to_string()))?;
        let lease_id =
            Uuid::parse_str(lease).map_err(|_| ReceiptHandleError::Malformed(s.to_string()))?;
        Ok(Self {
            message_id,
            lease_id,
        })
    }
}

/// Core message domain type, owned by exactly one queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub queue: String,
    pub body: MessageBody,
    pub attributes: Attributes,
    pub priority: u8,
    pub group_id: Option<String>,
    /// Per-queue publish sequence; the explicit publish order.
    pub seq: u64,
    pub enqueued_at: u64,
    pub available_at: u64,
    pub receive_count: u32,
    pub first_received_at: Option<u64>,
    pub status: MessageStatus,
    /// Handle of the most recent delivery, if any.
    pub last_receipt: Option<ReceiptHandle>,
}

impl Message {
    /// Default priority for messages published without one.
    pub const DEFAULT_PRIORITY: u8 = 5;

    /// Generate a new UUIDv7 message ID.
    pub fn new_id() -> Uuid {
        Uuid::now_v7()
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.to_string(), value.into());
    }
}

/// A message handed to a consumer by `receive`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message_id: Uuid,
    pub queue: String,
    pub body: MessageBody,
    pub attributes: Attributes,
    pub receipt_handle: ReceiptHandle,
    pub receive_count: u32,
}

/// Message metadata returned by `get_attributes`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageAttributes {
    pub message_id: Uuid,
    pub attributes: Attributes,
    pub receive_count: u32,
    pub first_received_at: Option<u64>,
    pub enqueued_at: u64,
}
