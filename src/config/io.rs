//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::{AppConfig, Transport};
use crate::error::{Error, Result};

/// A snapshot of the configuration file
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Path to the config file
    pub path: std::path::PathBuf,
    /// Whether the file exists
    pub exists: bool,
    /// Parsed configuration
    pub config: Option<AppConfig>,
    /// Problems encountered while reading
    pub issues: Vec<String>,
}

/// Load configuration with layered precedence:
/// 1. Config file if it exists, otherwise defaults
/// 2. Environment variable overrides (including `.env`)
pub fn load_config() -> Result<AppConfig> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    parse_config(&content, path.extension().and_then(|ext| ext.to_str()))
}

/// Parse configuration text; `extension` selects the format when known.
pub fn parse_config(content: &str, extension: Option<&str>) -> Result<AppConfig> {
    let config: AppConfig = match extension {
        Some("json") | Some("json5") => json5::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?,
        Some("toml") => toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?,
        _ => json5::from_str(content)
            .or_else(|_| toml::from_str(content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?,
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set variables. Env vars have the
/// highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut AppConfig) {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Overlay overrides read through `lookup`.
pub fn apply_overrides_from<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // MCP bridge overrides
    if let Some(command) = lookup("TOOLBRIDGE_MCP_COMMAND") {
        let mut parts = command.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            config.mcp_bridge.command = Some(program);
            config.mcp_bridge.args = parts.collect();
        }
    }
    if let Some(url) = lookup("TOOLBRIDGE_MCP_URL") {
        config.mcp_bridge.url = Some(url);
        config.mcp_bridge.transport = Transport::Http;
    }
    if let Some(transport) = lookup("TOOLBRIDGE_MCP_TRANSPORT") {
        match transport.parse() {
            Ok(t) => config.mcp_bridge.transport = t,
            Err(e) => tracing::warn!(error = %e, "Ignoring TOOLBRIDGE_MCP_TRANSPORT"),
        }
    }
    if let Some(secs) = lookup("TOOLBRIDGE_TOOL_CACHE_SECONDS") {
        if let Ok(v) = secs.parse() {
            config.mcp_bridge.tool_cache_seconds = v;
        }
    }

    // Model overrides
    if let Some(api_base) = lookup("TOOLBRIDGE_MODEL_API_BASE") {
        config.model.api_base = api_base;
    }
    if let Some(model) = lookup("TOOLBRIDGE_MODEL") {
        config.model.default_model = model;
    }

    // Logging overrides
    if let Some(level) = lookup("RUST_LOG") {
        config.log.level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.log.format = format;
    }
}

/// Save configuration to a file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

/// Read a configuration file into a snapshot
pub fn read_config_snapshot(path: &Path) -> ConfigSnapshot {
    if !path.exists() {
        return ConfigSnapshot {
            path: path.to_path_buf(),
            exists: false,
            config: None,
            issues: vec!["Configuration file does not exist".to_string()],
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigSnapshot {
            path: path.to_path_buf(),
            exists: true,
            config: Some(config),
            issues: Vec::new(),
        },
        Err(e) => ConfigSnapshot {
            path: path.to_path_buf(),
            exists: true,
            config: None,
            issues: vec![e.to_string()],
        },
    }
}
