//! Process configuration: built-in defaults, then an optional
//! `commerce.toml`, then `COMMERCE_*` environment variables.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use commerce_observability::LogFormat;

pub const CONFIG_FILE: &str = "commerce.toml";
pub const ENV_PREFIX: &str = "COMMERCE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] figment::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    /// MySQL event store and read models when set; in-memory otherwise.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Only honoured when built with the `redis` feature.
    pub redis_url: Option<String>,
    pub product_cache_ttl_secs: u64,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            product_cache_ttl_secs: 600,
            log_filter: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::figment().extract()?)
    }
}
