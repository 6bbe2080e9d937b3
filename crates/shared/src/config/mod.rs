//! Configuration module for the LabOps platform
//!
//! Centralized configuration loading, validation and DTOs for the server.
//!
//! # Architecture
//!
//! 1. **Single Source of Truth**: configuration is loaded once at startup
//! 2. **Fail Fast**: errors are reported immediately, no silent fallbacks
//! 3. **DTO Pattern**: configuration is immutable and passed via dependency injection
//! 4. **Env File Priority**: `.env` file > environment variables > defaults
//!
//! # Environment Variables
//!
//! - `LABOPS_BROKER_URL`: NATS connection URL (default: "nats://localhost:4222")
//! - `LABOPS_BROKER_EVENTS_ENABLED`: enable broker-backed eventing (default: 1)
//! - `LABOPS_DISPATCH_MAX_RETRIES`: max dispatch attempts per work order (default: 3)
//! - `LABOPS_DISPATCH_RETRY_INTERVAL_SECS`: fixed delay between attempts (default: 30)
//! - `LABOPS_DISPATCH_POLL_INTERVAL_SECS`: worker-loop poll interval (default: 10)
//! - `RUST_LOG`: log level filter (default: "info")

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

pub use dto::{BrokerConfig, DispatchConfig, LoggingConfig, ServerConfig};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::validate_server_config;
