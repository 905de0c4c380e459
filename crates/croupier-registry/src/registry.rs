//! # Service Registry - Registration, Discovery and Liveness
//!
//! Keeps the table of known services and speaks the registry protocol over
//! the broker. Nothing here calls a service directly.
//!
//! ## Features
//!
//! - **Registration**: `register_service` stores an owned record and
//!   broadcasts `ServiceRegistered`
//! - **Discovery**: a `ServiceDiscovery` broadcast is answered once per live
//!   owned record, addressed to the requester
//! - **Liveness**: `Heartbeat` messages refresh records; a sweep drops records
//!   silent for `heartbeat_interval × missed_heartbeats` and broadcasts
//!   `ServiceUnavailable`
//! - **Federation**: announcements from other registries on the same broker
//!   are kept as learned (not owned) records
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = ServiceRegistry::new(broker.clone(), RegistryConfig::default())?;
//! registry.register_service("svcA", "Lobby", "lobby")?;
//! let peers = registry.discover("table-1", Duration::from_millis(200)).await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use croupier_bus::{Broker, HandlerError, SubscriptionId};
use croupier_lifecycle::{ShutdownParticipant, TeardownError};
use croupier_types::{Message, MessageType, ServiceDescriptor};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::protocol::{self, REGISTRY_ID};
use crate::record::ServiceRecord;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Subscriber id the registry listens under. Distinct registries sharing
    /// a broker need distinct ids.
    pub registry_id: String,
    /// Expected interval between heartbeats.
    pub heartbeat_interval: Duration,
    /// Heartbeats a service may miss before it is swept.
    pub missed_heartbeats: u32,
    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_id: REGISTRY_ID.to_string(),
            heartbeat_interval: Duration::from_secs(5),
            missed_heartbeats: 3,
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Silence after which a record is swept.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.missed_heartbeats.max(1))
    }
}

/// Changes to the registry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A service registered here.
    Registered(ServiceDescriptor),
    /// A service announced by another registry was recorded.
    Learned(ServiceDescriptor),
    /// A service deregistered.
    Deregistered(ServiceDescriptor),
    /// A service stopped heart-beating and was swept.
    Expired(ServiceDescriptor),
}

/// Service registry bound to one broker. Cheap to clone.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    broker: Broker,
    config: RegistryConfig,
    records: RwLock<HashMap<String, ServiceRecord>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    token: CancellationToken,
    events: broadcast::Sender<RegistryEvent>,
}

type ProtocolHandler = fn(&RegistryInner, &Message) -> Result<(), RegistryError>;

impl ServiceRegistry {
    /// Create a registry, subscribe its protocol handlers and start the sweep.
    ///
    /// # Errors
    ///
    /// Fails if the broker is closed.
    pub fn new(broker: Broker, config: RegistryConfig) -> Result<Self, RegistryError> {
        let (events, _) = broadcast::channel(256);
        let registry = Self {
            inner: Arc::new(RegistryInner {
                broker,
                config,
                records: RwLock::new(HashMap::new()),
                subscriptions: Mutex::new(Vec::new()),
                token: CancellationToken::new(),
                events,
            }),
        };

        let routes: [(MessageType, ProtocolHandler); 5] = [
            (MessageType::Heartbeat, RegistryInner::on_heartbeat),
            (MessageType::ServiceDiscovery, RegistryInner::on_discovery),
            (MessageType::ServiceRegistered, RegistryInner::on_announced),
            (MessageType::ServiceDeregistered, RegistryInner::on_removed),
            (MessageType::ServiceUnavailable, RegistryInner::on_removed),
        ];
        for (message_type, handler) in routes {
            let id = registry.route(message_type, handler)?;
            registry.inner.subscriptions.lock().push(id);
        }

        registry.spawn_sweep();
        info!(
            registry = %registry.inner.config.registry_id,
            max_age_ms = registry.inner.config.max_age().as_millis() as u64,
            "[Registry] Started"
        );
        Ok(registry)
    }

    fn route(
        &self,
        message_type: MessageType,
        handler: ProtocolHandler,
    ) -> Result<SubscriptionId, RegistryError> {
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let id = self.inner.broker.subscribe_fn(
            self.inner.config.registry_id.clone(),
            Some(message_type),
            move |delivery| {
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return Ok(());
                    };
                    handler(&inner, &delivery.message).map_err(|e| HandlerError::new(e.to_string()))
                }
            },
        )?;
        Ok(id)
    }

    fn spawn_sweep(&self) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.token.clone();
        let period = self.inner.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.sweep_expired();
                    }
                }
            }
            debug!("[Registry] Sweep stopped");
        });
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// The broker the registry speaks through.
    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.inner.broker
    }

    /// Register a service owned by this registry.
    ///
    /// # Errors
    ///
    /// - `DuplicateServiceId` if the id is known (owned or learned)
    /// - `Bus` if the announcement could not be published; nothing is stored
    pub fn register_service(
        &self,
        service_id: impl Into<String>,
        name: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Result<ServiceDescriptor, RegistryError> {
        let descriptor = ServiceDescriptor::new(service_id, name, service_type);
        let id = descriptor.service_id.clone();

        {
            let mut records = self.inner.records.write();
            if records.contains_key(&id) {
                warn!(service = %id, "[Registry] ✗ Duplicate registration rejected");
                return Err(RegistryError::DuplicateServiceId { service_id: id });
            }
            records.insert(id.clone(), ServiceRecord::new(descriptor.clone(), true));
        }

        let published = protocol::announcement(
            MessageType::ServiceRegistered,
            &id,
            &self.inner.config.registry_id,
            &descriptor,
        )
        .and_then(|msg| self.inner.broker.publish(msg).map_err(RegistryError::from));
        if let Err(err) = published {
            self.inner.records.write().remove(&id);
            return Err(err);
        }

        info!(service = %descriptor, "[Registry] ✓ Registered");
        self.inner.emit(RegistryEvent::Registered(descriptor.clone()));
        Ok(descriptor)
    }

    /// Remove an owned service and broadcast `ServiceDeregistered`.
    ///
    /// # Errors
    ///
    /// `UnknownService` if no owned record exists.
    pub fn deregister_service(&self, service_id: &str) -> Result<ServiceRecord, RegistryError> {
        let record = {
            let mut records = self.inner.records.write();
            match records.get(service_id) {
                Some(record) if record.owned => records.remove(service_id),
                _ => None,
            }
        }
        .ok_or_else(|| RegistryError::UnknownService {
            service_id: service_id.to_string(),
        })?;

        let notice = protocol::announcement(
            MessageType::ServiceDeregistered,
            service_id,
            &self.inner.config.registry_id,
            &record.descriptor,
        )
        .and_then(|msg| self.inner.broker.publish(msg).map_err(RegistryError::from));
        if let Err(err) = notice {
            debug!(service = service_id, error = %err, "[Registry] Deregistration not announced");
        }

        info!(service = service_id, "[Registry] Deregistered");
        self.inner
            .emit(RegistryEvent::Deregistered(record.descriptor.clone()));
        Ok(record)
    }

    /// Publish a heartbeat for an owned service.
    ///
    /// # Errors
    ///
    /// `UnknownService` if the service is not registered here, `Bus` if the
    /// broker rejected the heartbeat.
    pub fn heartbeat(&self, service_id: &str) -> Result<(), RegistryError> {
        let owned = self
            .inner
            .records
            .read()
            .get(service_id)
            .is_some_and(|r| r.owned);
        if !owned {
            return Err(RegistryError::UnknownService {
                service_id: service_id.to_string(),
            });
        }
        self.inner.broker.publish(protocol::heartbeat(service_id))?;
        Ok(())
    }

    /// Ask every registry on the broker for its services and collect the
    /// replies that arrive within `window`.
    ///
    /// The request goes out under a private id derived from `requester`, so
    /// the requester's own subscriptions are left untouched.
    ///
    /// # Errors
    ///
    /// `Bus` if the broker is closed.
    pub async fn discover(
        &self,
        requester: &str,
        window: Duration,
    ) -> Result<Vec<ServiceDescriptor>, RegistryError> {
        let broker = &self.inner.broker;
        let reply_to = format!("{requester}/discover-{}", Uuid::new_v4());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = broker.subscribe_fn(
            reply_to.as_str(),
            Some(MessageType::ServiceRegistered),
            move |delivery| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(delivery.message);
                    Ok(())
                }
            },
        )?;

        let request = protocol::discovery_request(&reply_to);
        let request_id = request.id().clone();
        if let Err(err) = broker.publish(request) {
            broker.unsubscribe(subscription);
            return Err(err.into());
        }

        let mut found: Vec<ServiceDescriptor> = Vec::new();
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                Some(reply) = rx.recv() => {
                    if reply.in_response_to() != Some(&request_id) {
                        continue;
                    }
                    match protocol::decode(&reply) {
                        Ok(descriptor) => found.push(descriptor),
                        Err(err) => debug!(error = %err, "[Registry] Ignoring discovery reply"),
                    }
                }
            }
        }
        broker.unsubscribe(subscription);

        found.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        found.dedup_by(|a, b| a.service_id == b.service_id);
        debug!(requester, found = found.len(), "[Registry] Discovery finished");
        Ok(found)
    }

    /// Look up a record.
    #[must_use]
    pub fn record(&self, service_id: &str) -> Option<ServiceRecord> {
        self.inner.records.read().get(service_id).cloned()
    }

    /// Whether a service id is known.
    #[must_use]
    pub fn contains(&self, service_id: &str) -> bool {
        self.inner.records.read().contains_key(service_id)
    }

    /// All records, sorted by service id.
    #[must_use]
    pub fn services(&self) -> Vec<ServiceRecord> {
        let mut records: Vec<ServiceRecord> = self.inner.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.service_id().cmp(b.service_id()));
        records
    }

    /// Number of known services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Whether no services are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    /// Subscribe to table changes.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    /// Run one sweep now. Returns the services removed.
    pub fn sweep_expired(&self) -> Vec<ServiceDescriptor> {
        self.inner.sweep_expired()
    }

    /// Stop the sweep and unsubscribe from the broker. Idempotent.
    pub fn stop(&self) {
        self.inner.token.cancel();
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.lock());
        for id in subscriptions {
            self.inner.broker.unsubscribe(id);
        }
    }
}

#[async_trait]
impl ShutdownParticipant for ServiceRegistry {
    async fn teardown(&self) -> Result<(), TeardownError> {
        self.stop();
        info!(services = self.len(), "[Registry] Stopped");
        Ok(())
    }
}

impl RegistryInner {
    fn emit(&self, event: RegistryEvent) {
        let _ = self.events.send(event);
    }

    fn on_heartbeat(&self, message: &Message) -> Result<(), RegistryError> {
        if let Some(record) = self.records.write().get_mut(message.sender_id()) {
            record.last_heartbeat = Instant::now();
        }
        Ok(())
    }

    fn on_discovery(&self, request: &Message) -> Result<(), RegistryError> {
        let owned: Vec<ServiceDescriptor> = self
            .records
            .read()
            .values()
            .filter(|r| r.owned)
            .map(|r| r.descriptor.clone())
            .collect();

        for descriptor in owned {
            let reply = protocol::discovery_reply(request, &descriptor)?;
            if let Err(err) = self.broker.publish(reply) {
                debug!(
                    requester = request.sender_id(),
                    error = %err,
                    "[Registry] Discovery reply not delivered"
                );
            }
        }
        Ok(())
    }

    fn is_own(&self, message: &Message) -> bool {
        protocol::origin(message) == Some(self.config.registry_id.as_str())
    }

    fn on_announced(&self, message: &Message) -> Result<(), RegistryError> {
        if !message.is_broadcast() || self.is_own(message) {
            return Ok(());
        }
        let descriptor = protocol::decode(message)?;
        {
            let mut records = self.records.write();
            if records.contains_key(&descriptor.service_id) {
                return Ok(());
            }
            records.insert(
                descriptor.service_id.clone(),
                ServiceRecord::new(descriptor.clone(), false),
            );
        }
        debug!(service = %descriptor, registry = %self.config.registry_id, "[Registry] Learned service");
        self.emit(RegistryEvent::Learned(descriptor));
        Ok(())
    }

    fn on_removed(&self, message: &Message) -> Result<(), RegistryError> {
        if self.is_own(message) {
            return Ok(());
        }
        let descriptor = protocol::decode(message)?;
        let removed = {
            let mut records = self.records.write();
            match records.get(&descriptor.service_id) {
                Some(record) if !record.owned => records.remove(&descriptor.service_id),
                _ => None,
            }
        };
        if let Some(record) = removed {
            let event = match message.message_type() {
                MessageType::ServiceUnavailable => RegistryEvent::Expired(record.descriptor),
                _ => RegistryEvent::Deregistered(record.descriptor),
            };
            self.emit(event);
        }
        Ok(())
    }

    fn sweep_expired(&self) -> Vec<ServiceDescriptor> {
        let now = Instant::now();
        let max_age = self.config.max_age();

        let expired: Vec<ServiceRecord> = {
            let mut records = self.records.write();
            let ids: Vec<String> = records
                .values()
                .filter(|r| r.is_expired(now, max_age))
                .map(|r| r.descriptor.service_id.clone())
                .collect();
            ids.iter().filter_map(|id| records.remove(id)).collect()
        };

        let mut removed = Vec::with_capacity(expired.len());
        for record in expired {
            warn!(
                service = %record.descriptor,
                silent_ms = now.saturating_duration_since(record.last_heartbeat).as_millis() as u64,
                "[Registry] ✗ Service missed heartbeats, marking unavailable"
            );
            let notice = protocol::announcement(
                MessageType::ServiceUnavailable,
                &self.config.registry_id,
                &self.config.registry_id,
                &record.descriptor,
            )
            .and_then(|msg| self.broker.publish(msg).map_err(RegistryError::from));
            if let Err(err) = notice {
                debug!(error = %err, "[Registry] Unavailability not announced");
            }
            self.emit(RegistryEvent::Expired(record.descriptor.clone()));
            removed.push(record.descriptor);
        }
        removed
    }
}
