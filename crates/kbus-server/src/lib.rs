//! kbus broker
//!
//! Hosts the [`BusService`]: a registry of subscriptions with bounded
//! per-subscriber queues, long-poll event delivery, resource completion
//! tracking and an optional [`HealthChecker`]. [`BusServer`] exposes the
//! service over multiplexed length-delimited JSON frames on TCP.
//!
//! ```no_run
//! use kbus_server::{start_bus_server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), kbus_server::ServerError> {
//! let shutdown = CancellationToken::new();
//! start_bus_server(ServerConfig::default(), shutdown).await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod server;
pub mod service;

pub use config::{ServerConfig, ServiceConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::ServerError;
pub use health::{Advisory, HealthChecker, HealthCheckerConfig};
pub use server::{dispatch, start_bus_server, BusServer};
pub use service::{BusApi, BusService};
