//! Configuration management for the Shopfloor backend
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with SHOPFLOOR_ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;
use crate::store::KeyPolicy;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Storage backend selection
    pub store: StoreConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Statistics reconciliation
    pub statistics: StatisticsConfig,

    /// Best-effort side-effect queue
    pub side_effects: SideEffectsConfig,

    /// Purchase idempotency keys
    pub idempotency: IdempotencyConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

/// Which storage engine backs the collections
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to verify HS256 tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatisticsConfig {
    /// Seconds between background recompute passes; 0 disables them
    pub reconcile_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SideEffectsConfig {
    /// Bounded queue length before producers wait
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdempotencyConfig {
    /// Seconds before an unfinished claim may be taken over by a retry
    pub lease_secs: u64,

    /// Seconds a finished key keeps answering replays
    pub retention_secs: u64,

    /// Seconds between expired-key purges; 0 disables them
    pub purge_interval_secs: u64,
}

impl IdempotencyConfig {
    pub fn key_policy(&self) -> KeyPolicy {
        KeyPolicy {
            lease: Duration::from_secs(self.lease_secs),
            retention: Duration::from_secs(self.retention_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("SHOPFLOOR_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("store.backend", "postgres")?
            .set_default("statistics.reconcile_interval_secs", 300)?
            .set_default("side_effects.queue_capacity", 1024)?
            .set_default("idempotency.lease_secs", 30)?
            .set_default("idempotency.retention_secs", 86_400)?
            .set_default("idempotency.purge_interval_secs", 3_600)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (SHOPFLOOR_ prefix)
            .add_source(
                Environment::with_prefix("SHOPFLOOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings that would only fail later at runtime
    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(AppError::Configuration("jwt.secret must be set".to_string()));
        }
        if self.idempotency.lease_secs == 0 {
            return Err(AppError::Configuration(
                "idempotency.lease_secs must be positive".to_string(),
            ));
        }
        if self.idempotency.retention_secs < self.idempotency.lease_secs {
            return Err(AppError::Configuration(
                "idempotency.retention_secs cannot be shorter than the lease".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err(AppError::Configuration(
                "database.url is required for the postgres store".to_string(),
            ));
        }
        Ok(())
    }

    /// Configuration for tests and local runs against the in-memory store
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                min_connections: 0,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
            jwt: JwtConfig {
                secret: jwt_secret.into(),
            },
            statistics: StatisticsConfig {
                reconcile_interval_secs: 0,
            },
            side_effects: SideEffectsConfig { queue_capacity: 64 },
            idempotency: IdempotencyConfig {
                lease_secs: 30,
                retention_secs: 86_400,
                purge_interval_secs: 0,
            },
            logging: LoggingConfig { json: false },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
