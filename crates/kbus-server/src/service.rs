//! Bus Service: subscription registry, long-poll delivery and completion tracking
//!
//! Every subscriber owns a bounded FIFO queue. Publishing is a non-blocking
//! broadcast: when a subscriber's queue is full the event is dropped for that
//! subscriber only, so a slow consumer can never stall the publisher or the
//! other subscribers. Delivery is at most once per subscriber.

use crate::config::ServiceConfig;
use crate::health::HealthChecker;
use async_channel::{Receiver, Sender, TrySendError};
use kbus_proto::{
    unix_now, Event, EventRequest, EventResponse, HealthCheckRequest, HealthCheckResponse,
    PublishEventRequest, PublishEventResponse, ResourceState, SignalCompletionRequest,
    SignalCompletionResponse, SubscribeRequest, SubscribeResponse, WaitForCompletionRequest,
    WaitForCompletionResponse, COMPLETION_EVENT, HEALTH_UNAVAILABLE, INVALID_SUBSCRIPTION,
    NO_EVENTS_AVAILABLE, SUBSCRIPTION_CLOSED,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// The procedures a bus broker exposes, one method per remote call
///
/// Handlers never fail at the transport level: every problem is reported
/// through the `error` field of the response.
#[async_trait::async_trait]
pub trait BusApi: Send + Sync {
    async fn subscribe(&self, req: SubscribeRequest) -> SubscribeResponse;

    async fn get_event(&self, req: EventRequest) -> EventResponse;

    async fn publish_event(&self, req: PublishEventRequest) -> PublishEventResponse;

    async fn signal_completion(&self, req: SignalCompletionRequest) -> SignalCompletionResponse;

    async fn wait_for_completion(&self, req: WaitForCompletionRequest)
        -> WaitForCompletionResponse;

    async fn health_check(&self, req: HealthCheckRequest) -> HealthCheckResponse;
}

/// A subscriber's bounded queue
#[derive(Debug, Clone)]
struct Subscription {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl Subscription {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity);
        Self { sender, receiver }
    }
}

#[derive(Debug, Default)]
struct Registry {
    subs: HashMap<String, Subscription>,
    next_id: u64,
}

/// The broker: owns every subscription and every recorded resource state
#[derive(Debug)]
pub struct BusService {
    config: ServiceConfig,
    registry: Mutex<Registry>,
    resource_states: Mutex<HashMap<String, ResourceState>>,
    completions: Notify,
    health: Option<Arc<HealthChecker>>,
}

impl BusService {
    /// Create a broker; `health` receives metrics when present
    pub fn new(config: ServiceConfig, health: Option<Arc<HealthChecker>>) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            resource_states: Mutex::new(HashMap::new()),
            completions: Notify::new(),
            health,
        }
    }

    /// The attached health checker, if any
    pub fn health_checker(&self) -> Option<&Arc<HealthChecker>> {
        self.health.as_ref()
    }

    /// Number of registered subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.registry.lock().await.subs.len()
    }

    /// Number of events waiting in one subscription's queue
    pub async fn queued_events(&self, id: &str) -> Option<usize> {
        self.registry.lock().await.subs.get(id).map(|s| s.receiver.len())
    }

    /// Broadcast an event to every subscription without blocking
    ///
    /// A zero timestamp is replaced by the current time. Returns the number
    /// of subscribers the event was queued for.
    pub async fn broadcast(&self, mut event: Event) -> usize {
        if event.timestamp == 0 {
            event.timestamp = unix_now();
        }

        info!(
            event_type = %event.event_type,
            payload = %event.payload,
            resource_id = %event.resource_id,
            "Publishing event"
        );

        let mut queued = 0;
        let mut dropped = 0;
        {
            let registry = self.registry.lock().await;
            for (id, sub) in registry.subs.iter() {
                match sub.sender.try_send(event.clone()) {
                    Ok(()) => {
                        queued += 1;
                        debug!(id = %id, "Sent event to subscriber");
                    }
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        warn!(id = %id, "Subscriber queue full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(id = %id, "Subscriber queue closed, event skipped");
                    }
                }
            }
        }

        if let Some(health) = &self.health {
            for _ in 0..dropped {
                health.record_error().await;
            }
        }

        queued
    }

    /// Close every subscription queue
    ///
    /// Events already queued can still be drained; afterwards `GetEvent`
    /// reports the subscription as closed.
    pub async fn shutdown(&self) {
        let registry = self.registry.lock().await;
        for (id, sub) in registry.subs.iter() {
            sub.sender.close();
            debug!(id = %id, "Closed subscriber queue");
            if let Some(health) = &self.health {
                health.record_disconnection().await;
            }
        }
        info!("Bus service shutdown completed");
    }

    async fn record_get_event(&self, start: Instant) {
        if let Some(health) = &self.health {
            health.update_latency(start.elapsed()).await;
            health.record_event_processed().await;
        }
    }

    fn completion_timeout(&self, requested_secs: i64) -> Duration {
        if requested_secs > 0 {
            Duration::from_secs(requested_secs as u64)
        } else {
            self.config.completion_timeout
        }
    }
}

/// Stand-in deadline for timeouts too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating at a far-future instant
pub(crate) fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

#[async_trait::async_trait]
impl BusApi for BusService {
    async fn subscribe(&self, _req: SubscribeRequest) -> SubscribeResponse {
        let id = {
            let mut registry = self.registry.lock().await;
            let id = format!("sub-{}", registry.next_id);
            registry.next_id += 1;
            registry
                .subs
                .insert(id.clone(), Subscription::new(self.config.queue_capacity));
            id
        };
        info!(id = %id, "Client subscribed");

        if let Some(health) = &self.health {
            health.record_connection().await;
        }

        SubscribeResponse { id, error: None }
    }

    async fn get_event(&self, req: EventRequest) -> EventResponse {
        let start = Instant::now();

        let receiver = {
            let registry = self.registry.lock().await;
            registry.subs.get(&req.id).map(|s| s.receiver.clone())
        };

        let Some(receiver) = receiver else {
            if let Some(health) = &self.health {
                health.record_error().await;
            }
            self.record_get_event(start).await;
            return EventResponse {
                event: Event::default(),
                error: Some(INVALID_SUBSCRIPTION.to_string()),
            };
        };

        let response =
            match tokio::time::timeout(self.config.long_poll_timeout, receiver.recv()).await {
                Ok(Ok(event)) => {
                    debug!(
                        id = %req.id,
                        event_type = %event.event_type,
                        payload = %event.payload,
                        "Delivering event to client"
                    );
                    if let Some(health) = &self.health {
                        health.record_message_delivered().await;
                    }
                    EventResponse { event, error: None }
                }
                Ok(Err(_)) => EventResponse {
                    event: Event::default(),
                    error: Some(SUBSCRIPTION_CLOSED.to_string()),
                },
                Err(_) => EventResponse {
                    event: Event::default(),
                    error: Some(NO_EVENTS_AVAILABLE.to_string()),
                },
            };

        self.record_get_event(start).await;
        response
    }

    async fn publish_event(&self, req: PublishEventRequest) -> PublishEventResponse {
        self.broadcast(req.event).await;

        if let Some(health) = &self.health {
            health.record_message_published().await;
        }

        PublishEventResponse {
            success: true,
            error: None,
        }
    }

    async fn signal_completion(&self, req: SignalCompletionRequest) -> SignalCompletionResponse {
        let timestamp = unix_now();
        let state = ResourceState {
            resource_id: req.resource_id.clone(),
            status: req.status.clone(),
            data: req.data.clone(),
            timestamp,
        };
        self.resource_states
            .lock()
            .await
            .insert(req.resource_id.clone(), state);
        self.completions.notify_waiters();

        let event = Event {
            event_type: COMPLETION_EVENT.to_string(),
            payload: format!(
                "Resource {} completed with status: {}",
                req.resource_id, req.status
            ),
            resource_id: req.resource_id.clone(),
            data: req.data,
            timestamp,
        };
        self.broadcast(event).await;

        info!(
            resource_id = %req.resource_id,
            status = %req.status,
            "Resource completion signaled"
        );

        if let Some(health) = &self.health {
            health.record_resource_completion().await;
        }

        SignalCompletionResponse {
            success: true,
            error: None,
        }
    }

    async fn wait_for_completion(
        &self,
        req: WaitForCompletionRequest,
    ) -> WaitForCompletionResponse {
        let deadline = deadline_after(self.completion_timeout(req.timeout));

        loop {
            let notified = self.completions.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(state) = self.resource_states.lock().await.get(&req.resource_id) {
                info!(
                    resource_id = %req.resource_id,
                    status = %state.status,
                    "Resource completion detected"
                );
                return WaitForCompletionResponse {
                    success: true,
                    status: state.status.clone(),
                    data: state.data.clone(),
                    error: None,
                };
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(
                    resource_id = %req.resource_id,
                    "Timeout waiting for resource completion"
                );
                if let Some(health) = &self.health {
                    health.record_error().await;
                }
                return WaitForCompletionResponse {
                    success: false,
                    error: Some(format!(
                        "timeout waiting for resource {} to complete",
                        req.resource_id
                    )),
                    ..Default::default()
                };
            }
        }
    }

    async fn health_check(&self, _req: HealthCheckRequest) -> HealthCheckResponse {
        match &self.health {
            Some(health) => HealthCheckResponse {
                status: Some(health.get_health().await),
                error: None,
            },
            None => HealthCheckResponse {
                status: None,
                error: Some(HEALTH_UNAVAILABLE.to_string()),
            },
        }
    }
}
