//! Events and resource snapshots carried over the bus

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Free-form payload attached to events and completion signals
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// Event type for resource completion notifications published by the broker
pub const COMPLETION_EVENT: &str = "completion";

/// Event types that count as a cleanup signal
pub const CLEANUP_EVENTS: [&str; 2] = ["cleanup", "dockercleanup"];

/// A lifecycle event broadcast to every subscriber
///
/// Events carry no identity beyond their contents: two structurally equal
/// events are indistinguishable to a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub payload: String,

    #[serde(default)]
    pub resource_id: String,

    #[serde(default)]
    pub data: EventData,

    /// Unix seconds; 0 means "stamp on publish"
    #[serde(default)]
    pub timestamp: i64,
}

impl Event {
    /// Create an event with the given type and payload
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Attach a resource identifier
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Attach a data mapping
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Set the timestamp to the current time
    pub fn stamped(mut self) -> Self {
        self.timestamp = unix_now();
        self
    }

    /// Whether this event asks workers to clean up
    pub fn is_cleanup(&self) -> bool {
        CLEANUP_EVENTS.contains(&self.event_type.as_str())
    }
}

/// Snapshot of a resource's completion state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_id: String,

    /// "running", "completed", "failed", ...
    pub status: String,

    #[serde(default)]
    pub data: EventData,

    #[serde(default)]
    pub timestamp: i64,
}

/// Current time in Unix seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
