//! # Message Envelope
//!
//! The universal record carried by every exchange on the broker.
//!
//! ## Properties
//!
//! - **Immutable**: fields are set once through [`MessageBuilder`] and only
//!   exposed through getters afterwards.
//! - **Routing**: `receiver_id == None` means broadcast; otherwise only
//!   subscribers registered under that id are addressed.
//! - **Correlation**: replies carry `in_response_to` (the request id) and
//!   keep the request's `correlation_id`.
//! - **Acknowledgment**: `requires_ack` asks the broker to retry delivery
//!   until a message referencing this id is published.
//!
//! ## Wire Shape
//!
//! ```text
//! {
//!   "id": "6f0e…",            "type": "Heartbeat",
//!   "senderId": "table-1",    "receiverId": "lobby",      (optional)
//!   "payload": "…",           "headers": { "k": "v" },
//!   "correlationId": "…",     "inResponseTo": "…",        (optional)
//!   "timestamp": "2026-…Z",   "requiresAck": false
//! }
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

/// Well-known header keys set by the core on synthetic messages.
pub mod headers {
    /// Why a synthetic message was emitted (e.g. `ack-timeout`).
    pub const REASON: &str = "reason";
    /// Number of retries performed before a delivery failure.
    pub const RETRIES: &str = "retries";
    /// Exit code of a supervised process.
    pub const EXIT_CODE: &str = "exit-code";
    /// Logical service name of a supervised process.
    pub const SERVICE_NAME: &str = "service-name";
}

/// Unique identifier of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Enumerated message tag.
///
/// System tags are used by the core itself; application collaborators
/// (game engine, UI, …) use [`MessageType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum MessageType {
    /// Acknowledges the message named by `in_response_to`.
    Ack,
    /// Synthetic notice that a `requires_ack` message exhausted its retries.
    DeliveryFailed,
    /// A service was registered (announcement or discovery reply).
    ServiceRegistered,
    /// A service was deregistered by its owner.
    ServiceDeregistered,
    /// A service missed too many heartbeats.
    ServiceUnavailable,
    /// Request for every live service to announce itself.
    ServiceDiscovery,
    /// Periodic liveness signal.
    Heartbeat,
    /// A supervised OS process exited without being asked to.
    ProcessExited,
    /// The node is shutting down.
    ShutdownRequested,
    /// Application-defined tag.
    Custom(String),
}

impl MessageType {
    /// Shorthand for an application tag.
    pub fn custom(tag: impl Into<String>) -> Self {
        Self::Custom(tag.into())
    }

    /// The tag as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ack => "Ack",
            Self::DeliveryFailed => "DeliveryFailed",
            Self::ServiceRegistered => "ServiceRegistered",
            Self::ServiceDeregistered => "ServiceDeregistered",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::ServiceDiscovery => "ServiceDiscovery",
            Self::Heartbeat => "Heartbeat",
            Self::ProcessExited => "ProcessExited",
            Self::ShutdownRequested => "ShutdownRequested",
            Self::Custom(tag) => tag,
        }
    }

    /// Whether this tag is reserved for the core.
    #[must_use]
    pub fn is_system(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Ack" => Self::Ack,
            "DeliveryFailed" => Self::DeliveryFailed,
            "ServiceRegistered" => Self::ServiceRegistered,
            "ServiceDeregistered" => Self::ServiceDeregistered,
            "ServiceUnavailable" => Self::ServiceUnavailable,
            "ServiceDiscovery" => Self::ServiceDiscovery,
            "Heartbeat" => Self::Heartbeat,
            "ProcessExited" => Self::ProcessExited,
            "ShutdownRequested" => Self::ShutdownRequested,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// The message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    #[serde(rename = "type")]
    message_type: MessageType,
    sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    receiver_id: Option<String>,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_response_to: Option<MessageId>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    requires_ack: bool,
}

impl Message {
    /// Start building a message of `message_type` sent by `sender_id`.
    pub fn builder(message_type: MessageType, sender_id: impl Into<String>) -> MessageBuilder {
        MessageBuilder::new(message_type, sender_id)
    }

    /// Build the acknowledgment for `original`, sent by `sender_id`.
    ///
    /// The ack is addressed to the original sender and keeps its
    /// correlation id.
    pub fn ack_for(original: &Message, sender_id: impl Into<String>) -> Message {
        Self::reply_to(original, MessageType::Ack, sender_id).build()
    }

    /// Start building a reply of `message_type` to `original`.
    pub fn reply_to(
        original: &Message,
        message_type: MessageType,
        sender_id: impl Into<String>,
    ) -> MessageBuilder {
        let mut builder = MessageBuilder::new(message_type, sender_id)
            .to(original.sender_id.clone())
            .in_response_to(original.id.clone());
        if let Some(correlation) = &original.correlation_id {
            builder = builder.correlation_id(correlation.clone());
        }
        builder
    }

    /// Unique message id.
    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Message tag.
    #[must_use]
    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// Sending service id.
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Target service id, `None` for broadcast.
    #[must_use]
    pub fn receiver_id(&self) -> Option<&str> {
        self.receiver_id.as_deref()
    }

    /// Whether the message is a broadcast.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.receiver_id.is_none()
    }

    /// Opaque payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// A single header value.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Correlation id shared by a request and its replies.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Id of the message this one replies to.
    #[must_use]
    pub fn in_response_to(&self) -> Option<&MessageId> {
        self.in_response_to.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the sender asked for at-least-once delivery.
    #[must_use]
    pub fn requires_ack(&self) -> bool {
        self.requires_ack
    }

    /// Encode to the JSON wire shape.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the JSON wire shape.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Builder for [`Message`].
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    fn new(message_type: MessageType, sender_id: impl Into<String>) -> Self {
        Self {
            message: Message {
                id: MessageId::generate(),
                message_type,
                sender_id: sender_id.into(),
                receiver_id: None,
                payload: String::new(),
                headers: HashMap::new(),
                correlation_id: None,
                in_response_to: None,
                timestamp: Utc::now(),
                requires_ack: false,
            },
        }
    }

    /// Use an explicit id instead of a generated one.
    pub fn id(mut self, id: impl Into<MessageId>) -> Self {
        self.message.id = id.into();
        self
    }

    /// Address the message to a single receiver.
    pub fn to(mut self, receiver_id: impl Into<String>) -> Self {
        self.message.receiver_id = Some(receiver_id.into());
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.message.payload = payload.into();
        self
    }

    /// Add a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.headers.insert(key.into(), value.into());
        self
    }

    /// Set the correlation id.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.message.correlation_id = Some(correlation_id.into());
        self
    }

    /// Mark the message as a reply to `id`.
    pub fn in_response_to(mut self, id: impl Into<MessageId>) -> Self {
        self.message.in_response_to = Some(id.into());
        self
    }

    /// Ask for acknowledged delivery.
    pub fn requires_ack(mut self, requires_ack: bool) -> Self {
        self.message.requires_ack = requires_ack;
        self
    }

    /// Override the creation time.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.message.timestamp = timestamp;
        self
    }

    /// Finish the message.
    #[must_use]
    pub fn build(self) -> Message {
        self.message
    }
}
