//! Configuration types module

pub mod agent;
pub mod bridge;
pub mod model;

use serde::{Deserialize, Serialize};

pub use agent::AgentSettings;
pub use bridge::{BridgeConfig, Transport};
pub use model::ModelClientSettings;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// MCP server connection
    #[serde(default)]
    pub mcp_bridge: BridgeConfig,

    /// Agent prompt and tool settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Completion endpoint
    #[serde(default)]
    pub model: ModelClientSettings,

    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info,toolbridge=debug".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
