//! # Toolbridge
//!
//! Exposes tools published by a Model Context Protocol (MCP) server to a
//! language-model agent.
//!
//! ## Features
//!
//! - **MCP Tool Bridge:** stdio and streamable HTTP transports, a
//!   time-bounded tool catalog, and per-call timeouts
//! - **Normalized Results:** every tool call yields a `ToolExecutionResult`,
//!   including failures
//! - **Agent Loop:** a bounded tool-calling loop over any `CompletionClient`
//! - **OpenAI-compatible Client:** chat completions with function tools

pub mod agent;
pub mod config;
pub mod error;
pub mod mcp;

pub use config::AppConfig;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
