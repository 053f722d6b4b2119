//! Wire protocol definitions for the kbus message bus.
//!
//! This crate provides the shared vocabulary between the broker
//! (`kbus-server`) and its clients (`kbus-connect`): events, resource
//! snapshots, the request/response shapes of each `BusService` procedure,
//! health snapshots, and the length-delimited JSON frame codec.

pub mod codec;
pub mod error;
pub mod event;
pub mod health;
pub mod messages;

// Re-export commonly used types for convenience
pub use codec::{ClientCodec, FrameCodec, ServerCodec, MAX_FRAME_LENGTH};
pub use error::ProtoError;
pub use event::{unix_now, Event, EventData, ResourceState, CLEANUP_EVENTS, COMPLETION_EVENT};
pub use health::{BusMetrics, HealthStatus};
pub use messages::*;

/// Address the broker listens on unless configured otherwise
pub const DEFAULT_BUS_ADDRESS: &str = "127.0.0.1:12345";
