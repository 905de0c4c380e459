//! # Croupier Bus - In-Process Message Broker
//!
//! Every exchange between services goes through the [`Broker`]: plain
//! publish/subscribe for broadcasts, targeted delivery by subscriber id, and
//! at-least-once delivery for messages that set `requires_ack`.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐   mailbox   ┌──────────────┐
//! │  Service A   │ ────────────► │    Broker    │ ──────────► │  Service B   │
//! └──────────────┘               │              │             └──────────────┘
//!        ▲                       │ pending acks │                    │
//!        │   DeliveryFailed      │  + timers    │   ack (in_response_to)
//!        └────────────────────── │              │ ◄──────────────────┘
//!                                └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Exactly once per subscriber:** a publish enqueues one copy per matching
//!   subscription; retries add one copy per attempt
//! - **FIFO per subscriber:** one mailbox and one worker per subscription
//! - **Handler isolation:** errors and panics are caught and reported as
//!   [`BusEvent::HandlerFailed`]
//! - **One terminal ack state:** `Acked` or `Failed`, never both
//! - **Id retention:** reused ids and dangling `in_response_to` are rejected

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod ack;
pub mod broker;
pub mod error;
pub mod events;
pub mod handler;
pub mod id_cache;
pub mod middleware;
mod subscription;

pub use ack::{AckOutcome, AckPolicy, AckWaiter, Backoff};
pub use broker::{Broker, BrokerBuilder, BrokerConfig, PublishReceipt, BROKER_SENDER_ID};
pub use error::BusError;
pub use events::{BusEvent, REASON_ACK_TIMEOUT, REASON_BROKER_CLOSED};
pub use handler::{Delivery, FnHandler, HandlerError, MessageHandler, SubscriptionId};
pub use id_cache::MessageIdCache;
pub use middleware::{DeliveryOutcome, Middleware, TracingMiddleware};
