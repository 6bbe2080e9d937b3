//! Configuration loader
//!
//! Loads configuration from an optional `.env` file and environment
//! variables into typed DTOs, then validates the result.

use std::path::Path;

use super::dto::ServerConfig;
use super::error::{ConfigError, Result};
use super::validator::validate_server_config;

/// Configuration loader
///
/// Values loaded from the `.env` file are injected into the process
/// environment before the environment is read, so they win over unset
/// variables but never overwrite variables that are already exported.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Optional path to .env file
    env_file_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    pub fn new(env_file_path: Option<std::path::PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the server configuration.
    pub fn load_server_config(&self) -> Result<ServerConfig> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        let config = ServerConfig::from_env()?;
        validate_server_config(&config)?;
        Ok(config)
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|source| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_env_file_is_an_error() {
        let loader = ConfigLoader::new(Some("/nonexistent/.env".into()));
        let err = loader.load_server_config().unwrap_err();
        assert!(matches!(err, ConfigError::EnvFileLoad { .. }));
    }

    // Environment access is process-global, so everything that touches it
    // lives in a single test to avoid races between parallel tests.
    #[test]
    fn loads_defaults_then_env_file_overrides() {
        // With nothing set, every value falls back to its default.
        let loader = ConfigLoader::new(None);
        let config = loader.load_server_config().unwrap();
        assert_eq!(config.dispatch.max_retry_count, 3);
        assert_eq!(config.dispatch.retry_interval_secs, 30);
        assert!(config.broker.events_enabled);

        // An .env file feeds the same variables.
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        let mut file = std::fs::File::create(&env_path).unwrap();
        writeln!(file, "LABOPS_DISPATCH_MAX_RETRIES=5").unwrap();
        writeln!(file, "LABOPS_DISPATCH_RETRY_INTERVAL_SECS=2").unwrap();
        writeln!(file, "LABOPS_BROKER_EVENTS_ENABLED=0").unwrap();
        drop(file);

        let loader = ConfigLoader::new(Some(env_path));
        let config = loader.load_server_config().unwrap();
        assert_eq!(config.dispatch.max_retry_count, 5);
        assert_eq!(config.dispatch.retry_interval_secs, 2);
        assert!(!config.broker.events_enabled);
    }
}
