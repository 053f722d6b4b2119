/*!
 * kbus - a small lifecycle-event message bus
 *
 * A broker hands out subscriptions, each backed by a bounded FIFO queue,
 * and fans published events out to all of them. Workers long-poll for
 * events, signal resource completion and wait on each other's
 * completions. Clients reach the broker through a pooled, circuit-broken,
 * retrying connection layer.
 *
 * This crate is the command-line front end: configuration file, logging
 * setup and subcommands. The broker lives in `kbus-server`, the clients in
 * `kbus-connect`.
 */

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{BusConfig, LogLevel, LoggingConfig};
pub use error::{KbusError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
