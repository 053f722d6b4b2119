/*!
 * Configuration file for the kbus binary
 *
 * Every section and field is optional; anything left out takes the
 * library default. Durations are plain integers with the unit in the
 * field name.
 */

use crate::error::{KbusError, Result};
use kbus_connect::{ClientConfig, ResilientConfig};
use kbus_core_resilience::{CircuitBreakerConfig, PoolConfig, RetryConfig};
use kbus_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root of the TOML document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    pub server: ServerSection,
    pub client: ClientSection,
    pub retry: RetrySection,
    pub circuit_breaker: CircuitBreakerSection,
    pub logging: LoggingConfig,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Address the broker listens on and clients dial
    pub address: String,
    pub long_poll_timeout_ms: u64,
    pub queue_capacity: usize,
    pub completion_timeout_secs: u64,
    pub health_check_interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            address: defaults.address,
            long_poll_timeout_ms: defaults.long_poll_timeout.as_millis() as u64,
            queue_capacity: defaults.queue_capacity,
            completion_timeout_secs: defaults.completion_timeout.as_secs(),
            health_check_interval_secs: defaults.health_check_interval.as_secs(),
        }
    }
}

/// `[client]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub wait_deadline_ms: u64,
    pub poll_pause_ms: u64,
    /// Connections held by the resilient client (0 means default)
    pub pool_size: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            wait_deadline_ms: defaults.wait_deadline.as_millis() as u64,
            poll_pause_ms: defaults.poll_pause.as_millis() as u64,
            pool_size: PoolConfig::default().size,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_retries: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_interval_ms: defaults.initial_interval.as_millis() as u64,
            max_interval_ms: defaults.max_interval.as_millis() as u64,
            multiplier: defaults.multiplier,
        }
    }
}

/// `[circuit_breaker]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSection {
    pub max_failures: u64,
    pub reset_timeout_secs: u64,
    pub half_open_max_calls: u64,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            max_failures: defaults.max_failures,
            reset_timeout_secs: defaults.reset_timeout.as_secs(),
            half_open_max_calls: defaults.half_open_max_calls,
        }
    }
}

/// Logging level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: LogLevel,

    /// Write JSON logs here instead of the console
    pub file: Option<PathBuf>,

    /// Force debug level regardless of `level`
    #[serde(skip)]
    pub verbose: bool,
}

impl BusConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| KbusError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BusConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check every section against the library rules
    pub fn validate(&self) -> Result<()> {
        self.server_config()
            .validate()
            .map_err(|e| KbusError::Config(e.to_string()))?;
        self.resilient_config()
            .validate()
            .map_err(|e| KbusError::Config(e.to_string()))?;
        if self.client.poll_pause_ms == 0 {
            return Err(KbusError::Config(
                "client.poll_pause_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            address: self.server.address.clone(),
            long_poll_timeout: Duration::from_millis(self.server.long_poll_timeout_ms),
            queue_capacity: self.server.queue_capacity,
            completion_timeout: Duration::from_secs(self.server.completion_timeout_secs),
            health_check_interval: Duration::from_secs(self.server.health_check_interval_secs),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            wait_deadline: Duration::from_millis(self.client.wait_deadline_ms),
            poll_pause: Duration::from_millis(self.client.poll_pause_ms),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            initial_interval: Duration::from_millis(self.retry.initial_interval_ms),
            max_interval: Duration::from_millis(self.retry.max_interval_ms),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.circuit_breaker.max_failures,
            reset_timeout: Duration::from_secs(self.circuit_breaker.reset_timeout_secs),
            half_open_max_calls: self.circuit_breaker.half_open_max_calls,
        }
    }

    /// Settings for a resilient client dialing `server.address`
    pub fn resilient_config(&self) -> ResilientConfig {
        ResilientConfig {
            address: self.server.address.clone(),
            client: self.client_config(),
            retry: self.retry_config(),
            circuit_breaker: self.circuit_breaker_config(),
            pool: PoolConfig {
                size: self.client.pool_size,
            },
        }
    }
}
