//! Configuration loading and representation.
//!
//! Layers, later wins:
//! 1. Default values in code
//! 2. Optional `config/stockline.toml`
//! 3. Environment variables with the `STOCKLINE__` prefix, `__` between
//!    sections (e.g. `STOCKLINE__SERVER__PORT=8080`)

use std::path::Path;
use std::time::Duration;

use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;

use crate::command_dispatcher::DEFAULT_MAX_CONFLICT_RETRIES;

pub const DEFAULT_CONFIG_FILE: &str = "config/stockline";
pub const DEV_JWT_SECRET: &str = "stockline-dev-secret";
pub const DEFAULT_FORECAST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Conflict retries per unit of work before `RetryableConflict`.
    pub max_conflict_retries: u32,
}

/// Forecast/MRP collaborator. Recommendations are disabled without a base URL.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ForecastConfig {
    pub base_url: Option<String>,
    pub api_token: String,
    pub timeout_ms: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: String::new(),
            timeout_ms: DEFAULT_FORECAST_TIMEOUT_MS,
        }
    }
}

impl ForecastConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl AppConfig {
    /// Load from `config/stockline.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Load from an explicit TOML file (must exist) and the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        defaults()?
            .add_source(File::new(&path, FileFormat::Toml))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.auth.jwt_secret == DEV_JWT_SECRET
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let server = ServerConfig::default();
    config::Config::builder()
        .set_default("server.host", server.host)?
        .set_default("server.port", server.port)?
        .set_default("auth.jwt_secret", DEV_JWT_SECRET)?
        .set_default("dispatch.max_conflict_retries", DEFAULT_MAX_CONFLICT_RETRIES)?
        .set_default("forecast.api_token", "")?
        .set_default("forecast.timeout_ms", DEFAULT_FORECAST_TIMEOUT_MS)
}

fn environment() -> Environment {
    Environment::with_prefix("STOCKLINE")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
