//! Typed service configuration, read from the environment with `config` and
//! `dotenvy`.
//!
//! # Example
//!
//! ```no_run
//! use duo_signal::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod calls;
mod error;
mod redis;
mod server;

pub use calls::CallsConfig;
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a runnable
/// single-instance setup with in-memory quota storage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (bind address, logging, connection queues)
    #[serde(default)]
    pub server: ServerConfig,

    /// Ring timeout, quota limits and background task periods
    #[serde(default)]
    pub calls: CallsConfig,

    /// Shared quota store; in-memory storage is used when absent
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl AppConfig {
    /// Reads `DUO_SIGNAL__*` variables, after loading `.env` when present.
    ///
    /// Nested keys are joined with `__`:
    ///
    /// - `DUO_SIGNAL__SERVER__PORT=8080` -> `server.port`
    /// - `DUO_SIGNAL__CALLS__RING_TIMEOUT_SECS=60` -> `calls.ring_timeout_secs`
    /// - `DUO_SIGNAL__REDIS__URL=...` -> `redis.url`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("DUO_SIGNAL")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Checks every section; the first problem found is returned.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.calls.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
