//! kbus Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! Building blocks the bus client layers on top of its RPC transport:
//!
//! - **Circuit Breaker**: Fails fast while a dependency keeps failing, probes for recovery
//! - **Connection Pool**: Fixed set of eagerly opened connections shared round-robin
//! - **Retry Policy**: Bounded exponential backoff schedule
//!
//! # Key Principles
//!
//! This crate has no knowledge of the bus wire protocol or of sockets. The
//! pool talks to connections only through [`ConnectionFactory`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Resilient Client                │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Counts failures, opens on threshold)  │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Policy                      │  ← Bounded attempts
//! │  (Exponential backoff, capped)          │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Connection Pool                   │  ← Round-robin
//! │  (Eager, fixed size, all-or-nothing)    │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!             Broker
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use kbus_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let config = CircuitBreakerConfig {
//!     max_failures: 5,
//!     reset_timeout: Duration::from_secs(60),
//!     half_open_max_calls: 3,
//! };
//!
//! let breaker = CircuitBreaker::new(config);
//!
//! let result = breaker
//!     .execute(|| async { Ok::<_, ResilienceError>(42) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod connection_pool;
pub mod error;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig, DEFAULT_POOL_SIZE};
pub use error::ResilienceError;
pub use retry::{Backoff, RetryConfig};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use kbus_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig};
    pub use super::error::ResilienceError;
    pub use super::retry::RetryConfig;
}
