//! Error types for the kbus-connect crate

use kbus_core_resilience::ResilienceError;
use kbus_proto::ProtoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Codec(#[from] ProtoError),

    #[error("failed to connect to bus at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to bus closed")]
    ConnectionClosed,

    /// The server could not run the call at all
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The call ran and the broker reported a failure
    #[error("{op} failed: {message}")]
    Protocol { op: &'static str, message: String },

    /// The broker answered `success = false` without saying why
    #[error("{0} was not successful")]
    Failed(&'static str),

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("timeout waiting for events")]
    Timeout,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("no available connections in pool")]
    NoConnection,

    #[error("operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ConnectError>,
    },

    #[error("client closed")]
    Cancelled,

    #[error("resilience error: {0}")]
    Resilience(ResilienceError),
}

impl From<ResilienceError> for ConnectError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::CircuitOpen => ConnectError::CircuitOpen,
            ResilienceError::PoolEmpty => ConnectError::NoConnection,
            other => ConnectError::Resilience(other),
        }
    }
}

impl ConnectError {
    /// Whether the failure came from the connection rather than the broker's answer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConnectError::Io(_)
                | ConnectError::Codec(_)
                | ConnectError::Connect { .. }
                | ConnectError::ConnectionClosed
        )
    }

    /// The innermost error, looking through exhausted retries
    pub fn root(&self) -> &ConnectError {
        match self {
            ConnectError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resilience_conversion() {
        assert!(matches!(
            ConnectError::from(ResilienceError::CircuitOpen),
            ConnectError::CircuitOpen
        ));
        assert!(matches!(
            ConnectError::from(ResilienceError::PoolEmpty),
            ConnectError::NoConnection
        ));
        assert!(matches!(
            ConnectError::from(ResilienceError::InvalidConfig("x".into())),
            ConnectError::Resilience(_)
        ));
    }

    #[test]
    fn test_retries_exhausted_message_and_root() {
        let err = ConnectError::RetriesExhausted {
            attempts: 4,
            source: Box::new(ConnectError::Timeout),
        };
        assert_eq!(
            err.to_string(),
            "operation failed after 4 attempts: timeout waiting for events"
        );
        assert!(matches!(err.root(), ConnectError::Timeout));
    }

    #[test]
    fn test_protocol_message() {
        let err = ConnectError::Protocol {
            op: "subscribe",
            message: "registry full".to_string(),
        };
        assert_eq!(err.to_string(), "subscribe failed: registry full");
        assert!(!err.is_transport());
        assert!(ConnectError::ConnectionClosed.is_transport());
    }
}
