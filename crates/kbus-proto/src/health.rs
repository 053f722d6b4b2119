//! Health snapshot types shared by the broker and its clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operational counters accumulated by the broker's health checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMetrics {
    pub total_connections: i64,
    pub active_connections: i64,
    pub messages_published: i64,
    pub messages_delivered: i64,
    pub events_processed: i64,
    /// Exponential moving average of call latency
    pub average_latency: Duration,
    pub error_count: i64,
    pub resource_completions: i64,
    pub uptime_start: DateTime<Utc>,
}

impl BusMetrics {
    /// Fresh counters starting now
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Fresh counters with an explicit start time
    pub fn starting_at(uptime_start: DateTime<Utc>) -> Self {
        Self {
            total_connections: 0,
            active_connections: 0,
            messages_published: 0,
            messages_delivered: 0,
            events_processed: 0,
            average_latency: Duration::ZERO,
            error_count: 0,
            resource_completions: 0,
            uptime_start,
        }
    }

    /// Errors per processed event, or `None` before anything was processed
    pub fn error_rate(&self) -> Option<f64> {
        if self.events_processed > 0 {
            Some(self.error_count as f64 / self.events_processed as f64)
        } else {
            None
        }
    }
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable health report returned by `HealthCheck`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,

    /// When the periodic evaluation last ran, if ever
    pub last_check: Option<DateTime<Utc>>,

    /// Human-readable time since `metrics.uptime_start`
    pub uptime: String,

    pub metrics: BusMetrics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
