//! Health Checker: Operational metrics and a periodic liveness verdict
//!
//! Components feed counters and latency samples through the `record_*`
//! methods. A background loop evaluates the counters on a fixed interval,
//! flips the healthy flag when the error rate crosses its threshold and
//! reports advisories for conditions that are worth a warning but do not
//! affect the verdict.
//!
//! # Example
//!
//! ```
//! use kbus_server::health::{Advisory, HealthChecker, HealthCheckerConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let checker = HealthChecker::new(HealthCheckerConfig::default());
//!
//! checker.update_latency(Duration::from_millis(100)).await;
//! checker.update_latency(Duration::from_millis(200)).await;
//! assert_eq!(checker.metrics().await.average_latency, Duration::from_millis(110));
//!
//! let advisories = checker.perform_health_check().await;
//! assert!(advisories.is_empty());
//! assert!(checker.is_healthy().await);
//! # }
//! ```

use crate::service::deadline_after;
use chrono::{DateTime, Utc};
use kbus_proto::{BusMetrics, HealthStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Thresholds and cadence for health evaluation
#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    /// How often the background loop evaluates health
    pub check_interval: Duration,

    /// Error count that must be exceeded before the error rate matters
    pub max_error_count: i64,

    /// Errors per processed event above which the bus is unhealthy
    pub max_error_rate: f64,

    /// Uptime with zero processed events after which inactivity is reported
    pub inactivity_warning: Duration,

    /// Average latency above which a warning is reported
    pub latency_warning: Duration,

    /// Active connection count above which a warning is reported
    pub connection_warning: i64,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            max_error_count: 100,
            max_error_rate: 0.10,
            inactivity_warning: Duration::from_secs(5 * 60),
            latency_warning: Duration::from_secs(5),
            connection_warning: 1000,
        }
    }
}

/// Condition reported by a health evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    /// Error rate crossed the threshold; the only health-affecting advisory
    ErrorRateHigh { errors: i64, rate: f64 },

    /// No events were processed since startup
    Inactive { uptime: Duration },

    /// Average latency is above the warning level
    LatencyHigh { average: Duration },

    /// Too many active connections
    ConnectionsHigh { active: i64 },
}

#[derive(Debug)]
struct HealthState {
    metrics: BusMetrics,
    started: Instant,
    is_healthy: bool,
    last_check: Option<DateTime<Utc>>,
}

impl HealthState {
    fn fresh() -> Self {
        Self {
            metrics: BusMetrics::new(),
            started: Instant::now(),
            is_healthy: true,
            last_check: None,
        }
    }
}

/// Aggregates bus metrics and maintains the healthy/unhealthy verdict
#[derive(Debug)]
pub struct HealthChecker {
    config: HealthCheckerConfig,
    state: RwLock<HealthState>,
}

impl HealthChecker {
    /// Create a checker; a zero interval falls back to the default
    pub fn new(mut config: HealthCheckerConfig) -> Self {
        if config.check_interval.is_zero() {
            config.check_interval = HealthCheckerConfig::default().check_interval;
        }
        Self {
            config,
            state: RwLock::new(HealthState::fresh()),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &HealthCheckerConfig {
        &self.config
    }

    /// Spawn the periodic evaluation loop; it runs until `shutdown` fires
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let checker = Arc::clone(self);
        let period = self.config.check_interval;
        info!(interval = ?period, "Bus health checker started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(deadline_after(period), period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Health checker stopping due to cancellation");
                        return;
                    }
                    _ = ticker.tick() => {
                        checker.perform_health_check().await;
                    }
                }
            }
        })
    }

    pub async fn record_connection(&self) {
        let mut state = self.state.write().await;
        state.metrics.total_connections += 1;
        state.metrics.active_connections += 1;
    }

    pub async fn record_disconnection(&self) {
        let mut state = self.state.write().await;
        if state.metrics.active_connections > 0 {
            state.metrics.active_connections -= 1;
        }
    }

    pub async fn record_message_published(&self) {
        self.state.write().await.metrics.messages_published += 1;
    }

    pub async fn record_message_delivered(&self) {
        self.state.write().await.metrics.messages_delivered += 1;
    }

    pub async fn record_event_processed(&self) {
        self.state.write().await.metrics.events_processed += 1;
    }

    pub async fn record_resource_completion(&self) {
        self.state.write().await.metrics.resource_completions += 1;
    }

    /// Count an error; the verdict itself only changes on the next evaluation
    pub async fn record_error(&self) {
        self.state.write().await.metrics.error_count += 1;
    }

    /// Fold a latency sample into the moving average
    ///
    /// The first sample is taken as-is; later ones are blended with weight
    /// 0.9 on the previous average and 0.1 on the new sample.
    pub async fn update_latency(&self, sample: Duration) {
        let mut state = self.state.write().await;
        let average = &mut state.metrics.average_latency;

        if average.is_zero() {
            *average = sample;
        } else {
            let blended = (average.as_nanos() * 9 + sample.as_nanos()) / 10;
            *average = Duration::from_nanos(u64::try_from(blended).unwrap_or(u64::MAX));
        }
    }

    /// Evaluate the metrics once and update the verdict
    ///
    /// Returns the advisories raised by this evaluation. Only
    /// [`Advisory::ErrorRateHigh`] makes the bus unhealthy.
    pub async fn perform_health_check(&self) -> Vec<Advisory> {
        let mut state = self.state.write().await;
        state.last_check = Some(Utc::now());
        let previous = state.is_healthy;
        let metrics = &state.metrics;
        let mut advisories = Vec::new();

        if metrics.error_count > self.config.max_error_count {
            if let Some(rate) = metrics.error_rate() {
                if rate > self.config.max_error_rate {
                    warn!(
                        errors = metrics.error_count,
                        rate,
                        "Bus error rate above threshold, marking unhealthy"
                    );
                    advisories.push(Advisory::ErrorRateHigh {
                        errors: metrics.error_count,
                        rate,
                    });
                }
            }
        }

        let uptime = state.started.elapsed();
        if metrics.events_processed == 0 && uptime > self.config.inactivity_warning {
            warn!("Bus appears inactive - no events processed since startup");
            advisories.push(Advisory::Inactive { uptime });
        }

        if metrics.average_latency > self.config.latency_warning {
            warn!(avg_latency = ?metrics.average_latency, "High bus latency detected");
            advisories.push(Advisory::LatencyHigh {
                average: metrics.average_latency,
            });
        }

        if metrics.active_connections > self.config.connection_warning {
            warn!(
                count = metrics.active_connections,
                "High number of active connections"
            );
            advisories.push(Advisory::ConnectionsHigh {
                active: metrics.active_connections,
            });
        }

        let healthy = !advisories
            .iter()
            .any(|a| matches!(a, Advisory::ErrorRateHigh { .. }));

        debug!(
            healthy,
            connections = metrics.active_connections,
            events_processed = metrics.events_processed,
            avg_latency = ?metrics.average_latency,
            error_count = metrics.error_count,
            "Bus health check completed"
        );

        state.is_healthy = healthy;
        if previous != healthy {
            if healthy {
                info!("Bus health recovered");
            } else {
                error!("Bus health degraded");
            }
        }

        advisories
    }

    /// Current verdict
    pub async fn is_healthy(&self) -> bool {
        self.state.read().await.is_healthy
    }

    /// Copy of the current counters
    pub async fn metrics(&self) -> BusMetrics {
        self.state.read().await.metrics.clone()
    }

    /// Immutable snapshot for external consumers
    pub async fn get_health(&self) -> HealthStatus {
        let state = self.state.read().await;
        let uptime = Duration::from_secs(state.started.elapsed().as_secs());

        HealthStatus {
            healthy: state.is_healthy,
            last_check: state.last_check,
            uptime: humantime::format_duration(uptime).to_string(),
            metrics: state.metrics.clone(),
            error_message: None,
        }
    }

    /// Replace all metrics and force the verdict back to healthy
    ///
    /// Meant for test isolation.
    pub async fn reset_metrics(&self) {
        *self.state.write().await = HealthState::fresh();
        info!("Bus metrics reset");
    }
}
