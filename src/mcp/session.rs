//! Handshaked MCP sessions
//!
//! A session is one transport plus a completed `initialize` exchange.
//! Sessions are opened per operation and closed right after it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::errors::BridgeError;
use super::protocol::{
    extract_result, InitializeResult, JsonRpcNotification, JsonRpcRequest, ListToolsResult,
    ServerInfo, PROTOCOL_VERSION,
};
use super::transport::{TransportHandle, TransportTarget};
use super::types::ToolDescriptor;
use crate::config::BridgeConfig;

/// Upper bound on `tools/list` pages followed in one listing.
const MAX_LIST_PAGES: usize = 64;

/// Operations available on an open session.
#[async_trait]
pub trait ToolSession: Send {
    /// Fetch the full tool catalog, following pagination cursors.
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, BridgeError>;

    /// Run `tools/call` and return the raw result payload.
    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<Value, BridgeError>;

    /// Release the session. Never fails.
    async fn close(self: Box<Self>);
}

/// Opens sessions; one factory per server.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ToolSession>, BridgeError>;
}

// ---------------------------------------------------------------------------
// McpSession
// ---------------------------------------------------------------------------

/// Session over a real transport
pub struct McpSession {
    transport: TransportHandle,
    next_id: u64,
    server_info: Option<ServerInfo>,
}

impl McpSession {
    /// Open the transport and run the handshake. The transport is closed
    /// again if the handshake fails.
    pub async fn connect(target: &TransportTarget, http: &reqwest::Client) -> Result<Self, BridgeError> {
        let transport = TransportHandle::open(target, http).await?;
        let mut session = McpSession {
            transport,
            next_id: 1,
            server_info: None,
        };

        match session.handshake().await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.transport.close().await;
                Err(match e {
                    BridgeError::Handshake { .. }
                    | BridgeError::Transport { .. }
                    | BridgeError::Timeout { .. } => e,
                    other => BridgeError::Handshake {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Server identity reported during the handshake
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    async fn handshake(&mut self) -> Result<(), BridgeError> {
        let id = self.allocate_id();
        let response = self.transport.request(&JsonRpcRequest::initialize(id)).await?;
        let result = extract_result(response)?;
        let init: InitializeResult = serde_json::from_value(result).map_err(|e| BridgeError::Handshake {
            reason: format!("malformed initialize result: {}", e),
        })?;

        let version = init
            .protocol_version
            .clone()
            .unwrap_or_else(|| PROTOCOL_VERSION.to_string());
        self.transport.set_protocol_version(&version);

        if let Some(info) = &init.server_info {
            info!(server = %info.name, version = ?info.version, protocol = %version, "MCP server initialized");
        }
        self.server_info = init.server_info;

        self.transport.notify(&JsonRpcNotification::initialized()).await
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send(&mut self, build: impl FnOnce(u64) -> JsonRpcRequest) -> Result<Value, BridgeError> {
        let id = self.allocate_id();
        let response = self.transport.request(&build(id)).await?;
        extract_result(response)
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let page = cursor.take();
            let result = self
                .send(|id| JsonRpcRequest::list_tools(id, page.as_deref()))
                .await?;
            let listed: ListToolsResult = serde_json::from_value(result).map_err(|e| BridgeError::Protocol {
                code: -32602,
                message: format!("malformed tools/list result: {}", e),
                data: None,
            })?;

            tools.extend(listed.tools.into_iter().map(ToolDescriptor::from));
            match listed.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<Value, BridgeError> {
        self.send(|id| JsonRpcRequest::call_tool(id, name, arguments)).await
    }

    async fn close(self: Box<Self>) {
        self.transport.close().await;
    }
}

// ---------------------------------------------------------------------------
// TransportFactory
// ---------------------------------------------------------------------------

/// Opens `McpSession`s for one bridge configuration.
pub struct TransportFactory {
    config: BridgeConfig,
    context_env: HashMap<String, String>,
    http: reqwest::Client,
}

impl TransportFactory {
    pub fn new(config: BridgeConfig, context_env: HashMap<String, String>) -> Self {
        TransportFactory {
            config,
            context_env,
            http: reqwest::Client::new(),
        }
    }

    /// Resolve the target without opening anything
    pub fn target(&self) -> Result<TransportTarget, BridgeError> {
        TransportTarget::resolve(&self.config, &self.context_env)
    }
}

#[async_trait]
impl SessionFactory for TransportFactory {
    async fn open(&self) -> Result<Box<dyn ToolSession>, BridgeError> {
        let target = self.target()?;
        debug!(target = %target, "Opening MCP session");
        let session = McpSession::connect(&target, &self.http).await?;
        Ok(Box::new(session))
    }
}
