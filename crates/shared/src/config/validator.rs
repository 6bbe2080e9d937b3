//! Configuration validation

use super::dto::ServerConfig;
use super::error::{ConfigError, Result};

/// Validate a complete server configuration.
///
/// All checks run; the first failure is reported.
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    validate_broker_url(&config.broker.url, config.broker.events_enabled)?;
    validate_dispatch(config.dispatch.max_retry_count, config.dispatch.retry_interval_secs)?;
    validate_log_level(&config.logging.level)?;
    Ok(())
}

fn validate_broker_url(url: &str, events_enabled: bool) -> Result<()> {
    if !events_enabled {
        // Broker disabled at boot; the URL is irrelevant.
        return Ok(());
    }
    if url.is_empty() {
        return Err(ConfigError::Validation(
            "Broker URL cannot be empty when events are enabled".to_string(),
        ));
    }
    if !url.starts_with("nats://") && !url.starts_with("tls://") {
        return Err(ConfigError::Validation(format!(
            "Broker URL must start with nats:// or tls://, got: {}",
            url
        )));
    }
    Ok(())
}

fn validate_dispatch(max_retry_count: u32, retry_interval_secs: u64) -> Result<()> {
    if max_retry_count == 0 {
        return Err(ConfigError::Validation(
            "LABOPS_DISPATCH_MAX_RETRIES must be at least 1".to_string(),
        ));
    }
    if retry_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "LABOPS_DISPATCH_RETRY_INTERVAL_SECS must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_log_level(level: &str) -> Result<()> {
    // EnvFilter accepts full directives; only sanity-check the common case.
    if level.is_empty() {
        return Err(ConfigError::Validation(
            "Log level cannot be empty".to_string(),
        ));
    }
    Ok(())
}
