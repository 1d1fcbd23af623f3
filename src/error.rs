//! Error types for Toolbridge

use thiserror::Error;

use crate::agent::CompletionError;
use crate::mcp::BridgeError;

/// Result type alias using Toolbridge's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Toolbridge
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// MCP bridge error (transport, timeout, unknown tool, protocol)
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Completion client error that the agent loop could not recover from
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Prompt template error
    #[error("Template error: {0}")]
    Template(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Bridge(e) => matches!(
                e,
                BridgeError::Timeout { .. } | BridgeError::Transport { .. }
            ),
            Error::Completion(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::Config(_) | Error::InvalidInput(_) | Error::Template(_) => true,
            Error::Bridge(e) => e.status() / 100 == 4,
            _ => false,
        }
    }
}
