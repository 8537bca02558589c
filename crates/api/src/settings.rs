//! Service Configuration
//!
//! Layered as: built-in defaults, then `automation-engine.toml` (or the file
//! named by `AUTOMATION_CONFIG`), then `AUTOMATION__SECTION__KEY` variables.

use config::{Config, ConfigError, Environment, File};
use dispatcher::DispatchConfig;
use rule_engine::PipelineConfig;
use rule_validator::ValidationConfig;
use serde::{Deserialize, Serialize};
use sinks::MqttConfig;

/// Config file read when `AUTOMATION_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "automation-engine.toml";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub dispatch: DispatchConfig,
    pub validation: ValidationConfig,
    pub mqtt: MqttConfig,
    pub alerts: AlertsConfig,
    pub rules: RulesConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Alert storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// SQLite URL; alerts are only logged when unset
    pub database_url: Option<String>,
}

/// Rule sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// JSON array of rule drafts loaded at startup
    pub path: Option<String>,
    /// Cooldown state restored at startup and written on shutdown
    pub cooldown_snapshot: Option<String>,
}

impl ServiceConfig {
    /// Load from the default file location and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("AUTOMATION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load from `path` (optional) and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("AUTOMATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
