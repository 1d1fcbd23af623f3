//! MCP (Model Context Protocol) module
//!
//! Discovers and invokes tools published by an MCP server.
//!
//! ## Architecture
//!
//! - **transport**: stdio and streamable HTTP channels
//! - **session**: handshaked sessions and the `SessionFactory` seam
//! - **cache**: time-bounded tool catalog
//! - **client**: `BridgeClient`, the `ToolBridge` used by the agent
//! - **protocol**: wire types (JSON-RPC based)
//! - **types**: descriptors, invocations and normalized results
//!
//! ## Usage
//!
//! ```rust,no_run
//! use toolbridge::config::BridgeConfig;
//! use toolbridge::mcp::{BridgeClient, ToolBridge, ToolInvocation};
//!
//! # async fn example() -> toolbridge::Result<()> {
//! let config = BridgeConfig::stdio("python", vec!["math_server.py".into()]);
//! let bridge = BridgeClient::new(config)?;
//!
//! let tools = bridge.list_tools().await?;
//!
//! let args = serde_json::json!({"a": 1, "b": 2});
//! let invocation = ToolInvocation::new("sum", args.as_object().cloned().unwrap_or_default());
//! let result = bridge.call_tool(invocation).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod errors;
mod protocol;
mod session;
mod transport;
mod types;

pub use cache::{Catalog, ToolCatalogCache};
pub use client::{BridgeClient, ToolBridge};
pub use errors::BridgeError;
pub use protocol::{
    CallToolResult, InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, McpTool, McpToolAnnotations, ServerInfo, CLIENT_NAME,
    PROTOCOL_VERSION,
};
pub use session::{McpSession, SessionFactory, ToolSession, TransportFactory};
pub use transport::{
    HttpTransport, StdioTarget, StdioTransport, TransportHandle, TransportTarget,
    DEFAULT_INHERITED_ENV,
};
pub use types::{
    generate_call_id, ToolAnnotations, ToolCallRecord, ToolCallRequestLog, ToolDescriptor,
    ToolExecutionResult, ToolExecutionStatus, ToolInvocation,
};
