//! # Registry Protocol
//!
//! The registry speaks only in ordinary broker messages:
//!
//! | Type                  | Sender      | Receiver   | Payload          |
//! |-----------------------|-------------|------------|------------------|
//! | `ServiceRegistered`   | service id  | broadcast  | descriptor JSON  |
//! | `ServiceRegistered`   | service id  | requester  | descriptor JSON  |
//! | `ServiceDeregistered` | service id  | broadcast  | descriptor JSON  |
//! | `ServiceUnavailable`  | `registry`  | broadcast  | descriptor JSON  |
//! | `ServiceDiscovery`    | requester   | broadcast  | empty            |
//! | `Heartbeat`           | service id  | broadcast  | empty            |
//!
//! Discovery replies carry `in_response_to` = the discovery message id.
//! Broadcast announcements carry an `origin` header naming the announcing
//! registry, so a registry never learns from its own broadcasts.

use croupier_types::{Message, MessageType, ServiceDescriptor};

use crate::error::RegistryError;

/// Subscriber and sender id of the registry itself.
pub const REGISTRY_ID: &str = "registry";

/// Header naming the registry that broadcast an announcement.
pub const ORIGIN: &str = "origin";

/// Broadcast from registry `origin` announcing `descriptor`.
pub fn announcement(
    message_type: MessageType,
    sender: &str,
    origin: &str,
    descriptor: &ServiceDescriptor,
) -> Result<Message, RegistryError> {
    Ok(Message::builder(message_type, sender)
        .header(ORIGIN, origin)
        .payload(encode(descriptor)?)
        .build())
}

/// Registry that broadcast `message`, if it is an announcement.
#[must_use]
pub fn origin(message: &Message) -> Option<&str> {
    message.header(ORIGIN)
}

/// Reply to a discovery request on behalf of `descriptor`.
pub fn discovery_reply(
    request: &Message,
    descriptor: &ServiceDescriptor,
) -> Result<Message, RegistryError> {
    Ok(
        Message::reply_to(request, MessageType::ServiceRegistered, &descriptor.service_id)
            .payload(encode(descriptor)?)
            .build(),
    )
}

/// Discovery request from `requester`.
#[must_use]
pub fn discovery_request(requester: &str) -> Message {
    Message::builder(MessageType::ServiceDiscovery, requester).build()
}

/// Heartbeat from `service_id`.
#[must_use]
pub fn heartbeat(service_id: &str) -> Message {
    Message::builder(MessageType::Heartbeat, service_id).build()
}

/// Decode the descriptor carried by an announcement.
pub fn decode(message: &Message) -> Result<ServiceDescriptor, RegistryError> {
    serde_json::from_str(message.payload()).map_err(|e| RegistryError::MalformedAnnouncement {
        reason: e.to_string(),
    })
}

fn encode(descriptor: &ServiceDescriptor) -> Result<String, RegistryError> {
    serde_json::to_string(descriptor).map_err(|e| RegistryError::MalformedAnnouncement {
        reason: e.to_string(),
    })
}
