//! MCP bridge configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Supported MCP transport mechanisms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Transport {
    /// Launch the server as a child process and talk over stdin/stdout
    #[default]
    Stdio,
    /// Streamable HTTP endpoint
    Http,
}

impl std::str::FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            // "tcp" is accepted for configs written before HTTP support
            "http" | "tcp" => Ok(Transport::Http),
            other => Err(Error::Config(format!(
                "Invalid MCP transport: {}. Valid options: stdio, http",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Transport {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http => write!(f, "http"),
        }
    }
}

/// Configuration required to communicate with an MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Server command (stdio transport)
    #[serde(default)]
    pub command: Option<String>,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transport: Transport,
    /// Full endpoint URL (http transport)
    #[serde(default)]
    pub url: Option<String>,
    /// Host used to derive `http://{host}:{port}/mcp` when `url` is unset
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Server environment; values may be `${NAME}` placeholders
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the server process
    #[serde(default)]
    pub cwd: Option<String>,
    /// How long a fetched tool catalog stays fresh; 0 disables caching
    #[serde(default = "default_tool_cache_seconds")]
    pub tool_cache_seconds: f64,
    #[serde(default = "default_list_timeout_seconds")]
    pub list_timeout_seconds: f64,
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: f64,
}

fn default_tool_cache_seconds() -> f64 {
    30.0
}

fn default_list_timeout_seconds() -> f64 {
    10.0
}

fn default_call_timeout_seconds() -> f64 {
    60.0
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            command: None,
            args: Vec::new(),
            transport: Transport::Stdio,
            url: None,
            host: None,
            port: None,
            env: HashMap::new(),
            cwd: None,
            tool_cache_seconds: default_tool_cache_seconds(),
            list_timeout_seconds: default_list_timeout_seconds(),
            call_timeout_seconds: default_call_timeout_seconds(),
        }
    }
}

impl BridgeConfig {
    /// Stdio configuration launching `command`
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        BridgeConfig {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    /// HTTP configuration pointing at `url`
    pub fn http(url: impl Into<String>) -> Self {
        BridgeConfig {
            transport: Transport::Http,
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Check the numeric knobs
    pub fn validate(&self) -> Result<()> {
        if !self.tool_cache_seconds.is_finite() || self.tool_cache_seconds < 0.0 {
            return Err(Error::Config(format!(
                "tool_cache_seconds must be >= 0, got {}",
                self.tool_cache_seconds
            )));
        }
        for (name, value) in [
            ("list_timeout_seconds", self.list_timeout_seconds),
            ("call_timeout_seconds", self.call_timeout_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("{} must be > 0, got {}", name, value)));
            }
        }
        Ok(())
    }

    pub fn tool_cache_ttl(&self) -> Duration {
        seconds(self.tool_cache_seconds)
    }

    pub fn list_timeout(&self) -> Duration {
        seconds(self.list_timeout_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        seconds(self.call_timeout_seconds)
    }
}

/// Non-finite and negative values clamp to zero.
fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_parsing() {
        assert_eq!("stdio".parse::<Transport>().unwrap(), Transport::Stdio);
        assert_eq!("HTTP".parse::<Transport>().unwrap(), Transport::Http);
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Http);
        assert!("websocket".parse::<Transport>().is_err());
    }

    #[test]
    fn test_legacy_tcp_transport_deserializes_as_http() {
        let config: BridgeConfig =
            serde_json::from_value(json!({"transport": "tcp", "host": "localhost", "port": 8080}))
                .unwrap();
        assert_eq!(config.transport, Transport::Http);
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        let parsed = serde_json::from_value::<BridgeConfig>(json!({"transport": "carrier-pigeon"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_defaults() {
        let config: BridgeConfig = serde_json::from_value(json!({"command": "python"})).unwrap();
        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.tool_cache_seconds, 30.0);
        assert_eq!(config.list_timeout_seconds, 10.0);
        assert_eq!(config.call_timeout_seconds, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_knobs() {
        let mut config = BridgeConfig::stdio("python", vec![]);
        config.tool_cache_seconds = -1.0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::stdio("python", vec![]);
        config.call_timeout_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::stdio("python", vec![]);
        config.list_timeout_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::stdio("python", vec![]);
        config.tool_cache_seconds = 0.0;
        assert!(config.validate().is_ok());
    }
}
