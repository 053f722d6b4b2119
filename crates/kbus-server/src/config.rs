//! Broker configuration

use crate::error::ServerError;
use crate::health::HealthCheckerConfig;
use kbus_proto::DEFAULT_BUS_ADDRESS;
use std::time::Duration;

/// Default per-subscriber queue bound
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Settings the `BusService` itself consumes
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long `GetEvent` waits for an event before replying "no events available"
    pub long_poll_timeout: Duration,

    /// Events buffered per subscriber before new ones are dropped
    pub queue_capacity: usize,

    /// Wait used by `WaitForCompletion` when the caller passes 0
    pub completion_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            completion_timeout: Duration::from_secs(60),
        }
    }
}

/// Everything needed to run a broker
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    pub address: String,
    pub long_poll_timeout: Duration,
    pub queue_capacity: usize,
    pub completion_timeout: Duration,
    pub health_check_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            address: DEFAULT_BUS_ADDRESS.to_string(),
            long_poll_timeout: service.long_poll_timeout,
            queue_capacity: service.queue_capacity,
            completion_timeout: service.completion_timeout,
            health_check_interval: HealthCheckerConfig::default().check_interval,
        }
    }
}

impl ServerConfig {
    /// Default settings listening on `address`
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Reject settings the broker cannot run with
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.address.trim().is_empty() {
            return Err(ServerError::InvalidConfig(
                "address must not be empty".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.long_poll_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "long_poll_timeout must be greater than 0".to_string(),
            ));
        }
        if self.completion_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "completion_timeout must be greater than 0".to_string(),
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(ServerError::InvalidConfig(
                "health_check_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The subset handed to `BusService`
    pub fn service(&self) -> ServiceConfig {
        ServiceConfig {
            long_poll_timeout: self.long_poll_timeout,
            queue_capacity: self.queue_capacity,
            completion_timeout: self.completion_timeout,
        }
    }

    /// Health checker thresholds with this config's interval
    pub fn health(&self) -> HealthCheckerConfig {
        HealthCheckerConfig {
            check_interval: self.health_check_interval,
            ..Default::default()
        }
    }
}
