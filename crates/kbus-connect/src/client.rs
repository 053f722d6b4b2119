//! Basic bus client: typed wrappers around single broker calls

use crate::error::{ConnectError, Result};
use crate::transport::BusConnection;
use kbus_core_resilience::{ConnectionFactory, ResilienceError};
use kbus_proto::{
    unix_now, BusRequest, BusResponse, Event, EventData, EventRequest, HealthCheckRequest,
    HealthStatus, PublishEventRequest, ResourceState, SignalCompletionRequest, SubscribeRequest,
    WaitForCompletionRequest, NO_EVENTS_AVAILABLE,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Stand-in deadline for budgets too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Client-side timing
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Overall budget for one `wait_for_events` call
    pub wait_deadline: Duration,

    /// Pause after a long poll that came back empty
    pub poll_pause: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            wait_deadline: Duration::from_secs(5),
            poll_pause: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> std::result::Result<(), ResilienceError> {
        if self.wait_deadline.is_zero() {
            return Err(ResilienceError::InvalidConfig(
                "wait_deadline must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A client bound to one broker connection
#[derive(Debug)]
pub struct BusClient {
    conn: BusConnection,
    config: ClientConfig,
}

impl BusClient {
    /// Connect with default timing
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        let conn = BusConnection::connect(addr).await?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Register a new subscription and return its ID
    pub async fn subscribe(&self) -> Result<String> {
        match self
            .conn
            .call(BusRequest::Subscribe(SubscribeRequest {}))
            .await?
        {
            BusResponse::Subscribe(resp) => match resp.error {
                Some(message) => Err(ConnectError::Protocol {
                    op: "subscribe",
                    message,
                }),
                None => Ok(resp.id),
            },
            _ => Err(ConnectError::UnexpectedResponse("subscribe")),
        }
    }

    /// Subscribe, then feed delivered events to `handler` until it returns true
    ///
    /// Fails with [`ConnectError::Timeout`] once the configured deadline
    /// passes. An empty long poll is followed by a short pause; any other
    /// error ends the wait.
    pub async fn wait_for_events<F>(&self, handler: F) -> Result<()>
    where
        F: FnMut(&Event) -> bool,
    {
        self.wait_for_events_within(self.config.wait_deadline, handler)
            .await
    }

    async fn wait_for_events_within<F>(&self, budget: Duration, mut handler: F) -> Result<()>
    where
        F: FnMut(&Event) -> bool,
    {
        let id = self.subscribe().await?;
        debug!(id = %id, "Subscribed, waiting for events");
        let deadline = deadline_after(budget);

        while Instant::now() < deadline {
            let response = self
                .conn
                .call(BusRequest::GetEvent(EventRequest { id: id.clone() }))
                .await?;

            let resp = match response {
                BusResponse::GetEvent(resp) => resp,
                _ => return Err(ConnectError::UnexpectedResponse("get event")),
            };

            match resp.error {
                Some(message) if message == NO_EVENTS_AVAILABLE => {
                    tokio::time::sleep(self.config.poll_pause).await;
                }
                Some(message) => {
                    return Err(ConnectError::Protocol {
                        op: "get event",
                        message,
                    })
                }
                None => {
                    debug!(
                        id = %id,
                        event_type = %resp.event.event_type,
                        payload = %resp.event.payload,
                        "Received event"
                    );
                    if handler(&resp.event) {
                        return Ok(());
                    }
                }
            }
        }

        Err(ConnectError::Timeout)
    }

    /// Record a resource as finished and notify subscribers
    pub async fn signal_resource_completion(
        &self,
        resource_id: &str,
        status: &str,
        data: EventData,
    ) -> Result<()> {
        let request = BusRequest::SignalCompletion(SignalCompletionRequest {
            resource_id: resource_id.to_string(),
            status: status.to_string(),
            data,
        });

        match self.conn.call(request).await? {
            BusResponse::SignalCompletion(resp) => {
                if let Some(message) = resp.error {
                    return Err(ConnectError::Protocol {
                        op: "signal completion",
                        message,
                    });
                }
                if !resp.success {
                    return Err(ConnectError::Failed("signal completion"));
                }
                info!(resource_id = %resource_id, status = %status, "Signaled resource completion");
                Ok(())
            }
            _ => Err(ConnectError::UnexpectedResponse("signal completion")),
        }
    }

    /// Wait on the broker for a resource to complete; 0 seconds uses the broker default
    pub async fn wait_for_resource_completion(
        &self,
        resource_id: &str,
        timeout_seconds: i64,
    ) -> Result<ResourceState> {
        let request = BusRequest::WaitForCompletion(WaitForCompletionRequest {
            resource_id: resource_id.to_string(),
            timeout: timeout_seconds,
        });

        match self.conn.call(request).await? {
            BusResponse::WaitForCompletion(resp) => {
                if let Some(message) = resp.error {
                    return Err(ConnectError::Protocol {
                        op: "wait for completion",
                        message,
                    });
                }
                if !resp.success {
                    return Err(ConnectError::Failed("wait for completion"));
                }
                Ok(ResourceState {
                    resource_id: resource_id.to_string(),
                    status: resp.status,
                    data: resp.data,
                    timestamp: unix_now(),
                })
            }
            _ => Err(ConnectError::UnexpectedResponse("wait for completion")),
        }
    }

    /// Broadcast an event, stamped with the current time
    pub async fn publish_event(
        &self,
        event_type: &str,
        payload: &str,
        resource_id: &str,
        data: EventData,
    ) -> Result<()> {
        let event = Event::new(event_type, payload)
            .with_resource(resource_id)
            .with_data(data)
            .stamped();

        match self
            .conn
            .call(BusRequest::PublishEvent(PublishEventRequest { event }))
            .await?
        {
            BusResponse::PublishEvent(resp) => {
                if let Some(message) = resp.error {
                    return Err(ConnectError::Protocol {
                        op: "publish event",
                        message,
                    });
                }
                if !resp.success {
                    return Err(ConnectError::Failed("publish event"));
                }
                Ok(())
            }
            _ => Err(ConnectError::UnexpectedResponse("publish event")),
        }
    }

    /// Wait until a cleanup event arrives
    ///
    /// A positive `timeout_seconds` replaces the configured wait deadline.
    pub async fn wait_for_cleanup_signal(&self, timeout_seconds: i64) -> Result<Event> {
        let budget = if timeout_seconds > 0 {
            Duration::from_secs(timeout_seconds as u64)
        } else {
            self.config.wait_deadline
        };

        let mut received = None;
        self.wait_for_events_within(budget, |event| {
            if event.is_cleanup() {
                received = Some(event.clone());
                true
            } else {
                false
            }
        })
        .await?;

        let event = received.ok_or(ConnectError::UnexpectedResponse("wait for cleanup"))?;
        info!(event_type = %event.event_type, "Received cleanup signal");
        Ok(event)
    }

    /// Fetch the broker's health snapshot
    pub async fn health_check(&self) -> Result<HealthStatus> {
        match self
            .conn
            .call(BusRequest::HealthCheck(HealthCheckRequest {}))
            .await?
        {
            BusResponse::HealthCheck(resp) => match (resp.status, resp.error) {
                (_, Some(message)) => Err(ConnectError::Protocol {
                    op: "health check",
                    message,
                }),
                (Some(status), None) => Ok(status),
                (None, None) => Err(ConnectError::UnexpectedResponse("health check")),
            },
            _ => Err(ConnectError::UnexpectedResponse("health check")),
        }
    }
}

/// Opens [`BusClient`]s for a connection pool
#[derive(Debug, Clone)]
pub struct BusClientFactory {
    addr: String,
    config: ClientConfig,
}

impl BusClientFactory {
    pub fn new(addr: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl ConnectionFactory<BusClient> for BusClientFactory {
    async fn create(&self) -> std::result::Result<BusClient, ResilienceError> {
        BusClient::connect_with_config(&self.addr, self.config.clone())
            .await
            .map_err(|e| ResilienceError::ConnectFailed(e.to_string()))
    }

    async fn is_healthy(&self, client: &BusClient) -> bool {
        !client.is_closed()
    }

    async fn close(&self, client: &BusClient) {
        client.close().await;
    }
}
