//! Client-side connectivity for the kbus message bus
//!
//! - [`BusConnection`]: one multiplexed TCP connection, many concurrent calls
//! - [`BusClient`]: typed wrappers for each broker operation
//! - [`ResilientClient`]: pooled connections behind a circuit breaker and
//!   an exponential-backoff retry loop
//!
//! # Example
//!
//! ```rust,no_run
//! use kbus_connect::{ResilientClient, ResilientConfig};
//!
//! # async fn example() -> Result<(), kbus_connect::ConnectError> {
//! let client = ResilientClient::connect(ResilientConfig::with_address("127.0.0.1:12345")).await?;
//! client
//!     .publish_event("ready", "done", "build-42", Default::default())
//!     .await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod resilient;
pub mod transport;

pub use client::{BusClient, BusClientFactory, ClientConfig};
pub use error::ConnectError;
pub use resilient::{ClientMetrics, ResilientClient, ResilientConfig};
pub use transport::BusConnection;
