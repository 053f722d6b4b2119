//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a
//! dependency is experiencing issues. It has three states:
//! - Closed: Normal operation, calls pass through
//! - Open: Dependency is unhealthy, calls are rejected without running
//! - HalfOpen: A limited number of probe calls test whether it recovered

use super::error::ResilienceError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls fail immediately
    Open,
    /// Circuit is half-open, probing for recovery
    HalfOpen,
}

impl CircuitState {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures (while closed) before opening the circuit
    pub max_failures: u64,
    /// Time since the last failure after which an open circuit admits a probe
    pub reset_timeout: Duration,
    /// Number of successful probes in half-open required to close the circuit
    pub half_open_max_calls: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_failures == 0 {
            return Err(ResilienceError::InvalidConfig(
                "max_failures must be at least 1".to_string(),
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(ResilienceError::InvalidConfig(
                "half_open_max_calls must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of the breaker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub half_open_calls: u64,
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    /// Failures since the circuit last closed
    failure_count: u64,
    /// Lifetime successes
    success_count: u64,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
    /// Successful probes since entering half-open
    half_open_calls: u64,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_success_time: None,
            half_open_calls: 0,
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// The breaker is generic over the caller's error type: a rejected call is
/// reported as `E::from(ResilienceError::CircuitOpen)`.
///
/// # Example
/// ```no_run
/// use kbus_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError> {
///     let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
///
///     let result = breaker
///         .execute(|| async { Ok::<_, ResilienceError>(42) })
///         .await?;
///
///     println!("Result: {}", result);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Get the current state of the circuit breaker
    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Get failures recorded since the circuit last closed
    pub async fn get_failure_count(&self) -> u64 {
        self.state.lock().await.failure_count
    }

    /// Get lifetime success count
    pub async fn get_success_count(&self) -> u64 {
        self.state.lock().await.success_count
    }

    /// Time of the most recent success, if any
    pub async fn last_success(&self) -> Option<Instant> {
        self.state.lock().await.last_success_time
    }

    /// Read all counters under one lock acquisition
    pub async fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock().await;
        CircuitSnapshot {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            half_open_calls: state.half_open_calls,
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// If the circuit rejects the call, `op` is never invoked and the
    /// rejection is returned. Otherwise `op` runs and its outcome is
    /// recorded before being returned unchanged.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        if !self.allow_request().await {
            return Err(E::from(ResilienceError::CircuitOpen));
        }

        match op().await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(e) => {
                self.on_failure().await;
                Err(e)
            }
        }
    }

    /// Check admission and perform the Open -> HalfOpen transition if due
    async fn allow_request(&self) -> bool {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = state
                    .last_failure_time
                    .map(|t| t.elapsed() > self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled_down {
                    debug!("Circuit breaker entering half-open");
                    state.state = CircuitState::HalfOpen;
                    state.half_open_calls = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => state.half_open_calls < self.config.half_open_max_calls,
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;

        state.success_count += 1;
        state.last_success_time = Some(Instant::now());

        if state.state == CircuitState::HalfOpen {
            state.half_open_calls += 1;
            if state.half_open_calls >= self.config.half_open_max_calls {
                debug!("Circuit breaker closed after successful probes");
                state.state = CircuitState::Closed;
                state.failure_count = 0;
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;

        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        let trip = match state.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => state.failure_count >= self.config.max_failures,
            CircuitState::Open => false,
        };

        if trip {
            warn!(failures = state.failure_count, "Circuit breaker opened");
            state.state = CircuitState::Open;
        }
    }
}
