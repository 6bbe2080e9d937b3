//! Configuration Data Transfer Objects (DTOs)
//!
//! Immutable configuration DTOs loaded once at startup and passed to
//! services via dependency injection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{ConfigError, Result};

/// Configuration DTO for the LabOps server
///
/// Single source of truth for all server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Messaging broker configuration
    pub broker: BrokerConfig,

    /// Work-order dispatch configuration
    pub dispatch: DispatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Messaging broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// NATS connection URL
    /// Example: `nats://localhost:4222`
    pub url: String,

    /// Whether broker-backed eventing is enabled at all.
    ///
    /// When disabled, the broker health gate is bypassed and a no-op
    /// broker implementation is injected at boot.
    pub events_enabled: bool,
}

/// Work-order dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of dispatch attempts before a work order is broken
    pub max_retry_count: u32,

    /// Fixed delay between dispatch attempts (seconds)
    pub retry_interval_secs: u64,

    /// How often the dispatch worker polls for queued work orders (seconds)
    pub poll_interval_secs: u64,
}

impl DispatchConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
}

impl ServerConfig {
    /// Build the configuration from environment variables, applying
    /// documented defaults for everything that is absent.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker: BrokerConfig {
                url: env_or("LABOPS_BROKER_URL", "nats://localhost:4222"),
                events_enabled: env_bool("LABOPS_BROKER_EVENTS_ENABLED", true)?,
            },
            dispatch: DispatchConfig {
                max_retry_count: env_parse("LABOPS_DISPATCH_MAX_RETRIES", 3)?,
                retry_interval_secs: env_parse("LABOPS_DISPATCH_RETRY_INTERVAL_SECS", 30)?,
                poll_interval_secs: env_parse("LABOPS_DISPATCH_POLL_INTERVAL_SECS", 10)?,
            },
            logging: LoggingConfig {
                level: env_or("RUST_LOG", "info"),
            },
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(var: &str, default: bool) -> Result<bool> {
    match std::env::var(var) {
        Ok(raw) => match raw.as_str() {
            "1" | "true" | "TRUE" | "yes" => Ok(true),
            "0" | "false" | "FALSE" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_config_exposes_durations() {
        let config = DispatchConfig {
            max_retry_count: 3,
            retry_interval_secs: 30,
            poll_interval_secs: 10,
        };
        assert_eq!(config.retry_interval(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
    }
}
