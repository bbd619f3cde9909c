//! Configuration management for the call-center voice agent
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, then `config/{env}.yaml`)
//! - Environment variables (`CALL_AGENT__` prefix)
//!
//! Tenant definitions live in a separate YAML file (`config/tenants.yaml` by
//! default) loaded into an immutable snapshot by [`StaticTenantDirectory`].

pub mod settings;
pub mod tenant;

pub use settings::{
    load_settings, ListenerBinding, ObservabilityConfig, PersistenceConfig, RuntimeEnvironment,
    ServerConfig, Settings, SilenceEscalation, SpeechConfig, TurnConfig,
};
pub use tenant::{StaticTenantDirectory, TenantFile};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
