//! Resilient client: a pooled, circuit-broken, retrying wrapper over [`BusClient`]
//!
//! Every operation runs as
//!
//! ```text
//! circuit breaker ── admits? ──► retry loop ──► pool.get() ──► BusClient op
//!       │                          │  backoff sleeps
//!       └─ CircuitOpen             └─ abort on close()
//! ```
//!
//! The breaker sees one outcome per logical operation, not one per attempt.

use crate::client::{BusClient, BusClientFactory, ClientConfig};
use crate::error::{ConnectError, Result};
use kbus_core_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ConnectionFactory, ConnectionPool,
    PoolConfig, ResilienceError, RetryConfig,
};
use kbus_proto::{Event, EventData, HealthStatus, ResourceState, DEFAULT_BUS_ADDRESS};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a [`ResilientClient`] needs to start
#[derive(Debug, Clone)]
pub struct ResilientConfig {
    pub address: String,
    pub client: ClientConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub pool: PoolConfig,
}

impl Default for ResilientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BUS_ADDRESS.to_string(),
            client: ClientConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl ResilientConfig {
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ResilienceError> {
        self.client.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }
}

/// Diagnostics snapshot returned by [`ResilientClient::get_metrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientMetrics {
    pub circuit_state: CircuitState,
    pub circuit_failures: u64,
    pub circuit_successes: u64,
    pub pool_healthy: bool,
    pub pool_size: usize,
}

pub struct ResilientClient {
    pool: ConnectionPool<BusClient>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl ResilientClient {
    /// Validate `config` and open the whole pool
    pub async fn connect(config: ResilientConfig) -> Result<Self> {
        config.validate()?;

        let factory: Arc<dyn ConnectionFactory<BusClient>> = Arc::new(BusClientFactory::new(
            config.address.clone(),
            config.client.clone(),
        ));
        let pool = ConnectionPool::connect(factory, config.pool.clone()).await?;

        info!(
            address = %config.address,
            pool_size = pool.size(),
            max_retries = config.retry.max_retries,
            "Resilient bus client ready"
        );

        Ok(Self::with_parts(
            pool,
            CircuitBreaker::new(config.circuit_breaker),
            config.retry,
        ))
    }

    /// Assemble from an existing pool and breaker
    pub fn with_parts(
        pool: ConnectionPool<BusClient>,
        breaker: CircuitBreaker,
        retry: RetryConfig,
    ) -> Self {
        Self {
            pool,
            breaker,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `op` under the circuit breaker with retries
    pub async fn execute_with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(Arc<BusClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.breaker.execute(|| self.retry_operation(op)).await
    }

    async fn retry_operation<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<BusClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.retry.max_attempts();
        let mut waits = self.retry.backoff();
        let mut last_error = ConnectError::NoConnection;

        for attempt in 0..attempts {
            if attempt > 0 {
                let wait = waits.next().unwrap_or(self.retry.max_interval);
                debug!(attempt, wait = ?wait, "Retrying bus operation");
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(ConnectError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            let Some(client) = self.pool.get().await else {
                debug!(attempt, "No pooled connection available");
                last_error = ConnectError::NoConnection;
                continue;
            };

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ConnectError::Cancelled),
                outcome = op(client) => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(attempt, error = %e, "Bus operation attempt failed");
                    last_error = e;
                }
            }
        }

        warn!(attempts, error = %last_error, "Bus operation failed after retries");
        Err(ConnectError::RetriesExhausted {
            attempts,
            source: Box::new(last_error),
        })
    }

    pub async fn signal_resource_completion(
        &self,
        resource_id: &str,
        status: &str,
        data: EventData,
    ) -> Result<()> {
        self.execute_with_retry(|client| {
            let (resource_id, status, data) =
                (resource_id.to_string(), status.to_string(), data.clone());
            async move {
                client
                    .signal_resource_completion(&resource_id, &status, data)
                    .await
            }
        })
        .await
    }

    pub async fn wait_for_resource_completion(
        &self,
        resource_id: &str,
        timeout_seconds: i64,
    ) -> Result<ResourceState> {
        self.execute_with_retry(|client| {
            let resource_id = resource_id.to_string();
            async move {
                client
                    .wait_for_resource_completion(&resource_id, timeout_seconds)
                    .await
            }
        })
        .await
    }

    pub async fn publish_event(
        &self,
        event_type: &str,
        payload: &str,
        resource_id: &str,
        data: EventData,
    ) -> Result<()> {
        self.execute_with_retry(|client| {
            let (event_type, payload, resource_id, data) = (
                event_type.to_string(),
                payload.to_string(),
                resource_id.to_string(),
                data.clone(),
            );
            async move {
                client
                    .publish_event(&event_type, &payload, &resource_id, data)
                    .await
            }
        })
        .await
    }

    pub async fn wait_for_cleanup_signal(&self, timeout_seconds: i64) -> Result<Event> {
        self.execute_with_retry(|client| async move {
            client.wait_for_cleanup_signal(timeout_seconds).await
        })
        .await
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.execute_with_retry(|client| async move { client.health_check().await })
            .await
    }

    /// Snapshot of breaker and pool state for diagnostics
    pub async fn get_metrics(&self) -> ClientMetrics {
        let circuit = self.breaker.snapshot().await;
        ClientMetrics {
            circuit_state: circuit.state,
            circuit_failures: circuit.failure_count,
            circuit_successes: circuit.success_count,
            pool_healthy: self.pool.health().await,
            pool_size: self.pool.size(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Abort in-flight waits and close every pooled connection
    pub async fn close(&self) {
        self.cancel.cancel();
        self.pool.close().await;
        info!("Resilient bus client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ResilientConfig::default();
        assert_eq!(config.address, "127.0.0.1:12345");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.circuit_breaker.max_failures, 5);
        assert_eq!(config.pool.size, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ResilientConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = ResilientConfig::default();
        config.client.wait_deadline = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_serialize() {
        let metrics = ClientMetrics {
            circuit_state: CircuitState::HalfOpen,
            circuit_failures: 2,
            circuit_successes: 7,
            pool_healthy: true,
            pool_size: 5,
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["circuit_state"], "half_open");
        assert_eq!(json["circuit_failures"], 2);
        assert_eq!(json["pool_size"], 5);
    }

    #[tokio::test]
    async fn test_connect_to_nothing_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = ResilientClient::connect(ResilientConfig::with_address(addr.to_string())).await;
        assert!(matches!(
            result,
            Err(ConnectError::Resilience(ResilienceError::ConnectionCreation { index: 0, .. }))
        ));
    }
}
