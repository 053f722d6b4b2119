//! Error types for the resilience primitives

use thiserror::Error;

/// Errors that can occur in resilience operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// Circuit breaker is open, rejecting requests
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Pool has been closed or holds no connections
    #[error("no available connections in pool")]
    PoolEmpty,

    /// Opening one of the pool's connections failed
    #[error("failed to create connection {index}: {reason}")]
    ConnectionCreation { index: usize, reason: String },

    /// A connection factory could not open a connection
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// Check if this error was produced without the wrapped operation running
    pub fn is_rejection(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen | ResilienceError::PoolEmpty)
    }
}
