//! MCP bridge error types.

use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised when a bridge operation cannot be dispatched.
///
/// Tool-level failures reported by the server (`isError: true`) are not
/// errors; they come back as a `ToolExecutionResult` with an error status.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Bad or incomplete bridge configuration.
    #[error("bridge config error: {reason}")]
    Config { reason: String },

    /// The session could not be opened or the channel broke.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The `initialize` handshake failed.
    #[error("handshake with MCP server failed: {reason}")]
    Handshake { reason: String },

    /// An operation exceeded its configured budget.
    #[error("timed out during '{operation}' after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Requested tool is absent from the current catalog.
    #[error("tool '{name}' is not available")]
    ToolNotFound { name: String },

    /// Server answered with a JSON-RPC error.
    #[error("MCP protocol error [{code}]: {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl BridgeError {
    pub fn config(reason: impl Into<String>) -> Self {
        BridgeError::Config {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        BridgeError::Transport {
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Config { .. } => "config",
            BridgeError::Transport { .. } => "transport",
            BridgeError::Handshake { .. } => "handshake",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::ToolNotFound { .. } => "not_found",
            BridgeError::Protocol { .. } => "protocol",
        }
    }

    /// HTTP-equivalent status code.
    pub fn status(&self) -> u16 {
        match self {
            BridgeError::Config { .. } => 400,
            BridgeError::ToolNotFound { .. } => 404,
            BridgeError::Timeout { .. } => 504,
            BridgeError::Transport { .. }
            | BridgeError::Handshake { .. }
            | BridgeError::Protocol { .. } => 502,
        }
    }

    /// Structured details for callers and logs.
    pub fn details(&self) -> Value {
        let mut details = json!({
            "kind": self.kind(),
            "status": self.status(),
        });
        match self {
            BridgeError::Timeout {
                operation,
                timeout_ms,
            } => {
                details["operation"] = json!(operation);
                details["timeout_ms"] = json!(timeout_ms);
            }
            BridgeError::ToolNotFound { name } => {
                details["tool_name"] = json!(name);
            }
            BridgeError::Protocol { code, data, .. } => {
                details["code"] = json!(code);
                if let Some(data) = data {
                    details["data"] = data.clone();
                }
            }
            _ => {}
        }
        details
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::ToolNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_details_carry_404() {
        let err = BridgeError::ToolNotFound {
            name: "ghost".into(),
        };
        let details = err.details();
        assert_eq!(details["status"], 404);
        assert_eq!(details["kind"], "not_found");
        assert_eq!(details["tool_name"], "ghost");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_timeout_is_distinct_from_transport() {
        let timeout = BridgeError::Timeout {
            operation: "tools/call".into(),
            timeout_ms: 1500,
        };
        let transport = BridgeError::transport("connection refused");

        assert_eq!(timeout.details()["status"], 504);
        assert_eq!(timeout.details()["timeout_ms"], 1500);
        assert_eq!(transport.details()["status"], 502);
        assert_ne!(timeout.kind(), transport.kind());
        assert!(timeout.to_string().contains("1500ms"));
    }

    #[test]
    fn test_protocol_details_include_code() {
        let err = BridgeError::Protocol {
            code: -32601,
            message: "Method not found".into(),
            data: Some(json!({"method": "tools/call"})),
        };
        let details = err.details();
        assert_eq!(details["code"], -32601);
        assert_eq!(details["data"]["method"], "tools/call");
    }
}
