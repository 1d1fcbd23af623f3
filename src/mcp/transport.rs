//! MCP transports
//!
//! A transport carries JSON-RPC messages to one server, either over a child
//! process's stdin/stdout (one message per line) or over streamable HTTP
//! (POST, answered with a JSON body or an SSE stream).

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;
use url::Url;

use super::errors::BridgeError;
use super::protocol::{match_message, match_response, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::config::{build_environment, BridgeConfig, Transport};

/// Session header issued by streamable HTTP servers.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// Negotiated protocol revision, echoed after `initialize`.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// Variables a spawned server inherits from this process; everything else
/// must come from the bridge `env`.
pub const DEFAULT_INHERITED_ENV: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

/// How long a server gets to exit after stdin closes before it is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Target resolution
// ---------------------------------------------------------------------------

/// Where a session connects. Resolving performs no I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportTarget {
    Stdio(StdioTarget),
    Http { url: Url },
}

/// A server process to launch
#[derive(Debug, Clone, PartialEq)]
pub struct StdioTarget {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    /// Already-resolved environment
    pub env: HashMap<String, String>,
}

impl TransportTarget {
    /// Resolve `config` against the caller's environment.
    pub fn resolve(
        config: &BridgeConfig,
        context_env: &HashMap<String, String>,
    ) -> Result<Self, BridgeError> {
        match config.transport {
            Transport::Stdio => {
                let command = config
                    .command
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| BridgeError::config("stdio transport requires a command"))?;
                Ok(TransportTarget::Stdio(StdioTarget {
                    command: command.to_string(),
                    args: config.args.clone(),
                    cwd: config.cwd.clone(),
                    env: build_environment(config, context_env),
                }))
            }
            Transport::Http => {
                let raw = match (&config.url, &config.host, config.port) {
                    (Some(url), _, _) => url.clone(),
                    (None, Some(host), Some(port)) => format!("http://{}:{}/mcp", host, port),
                    _ => {
                        return Err(BridgeError::config(
                            "http transport requires a url, or both host and port",
                        ))
                    }
                };
                let url = Url::parse(&raw)
                    .map_err(|e| BridgeError::config(format!("invalid MCP url '{}': {}", raw, e)))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(BridgeError::config(format!(
                        "unsupported url scheme '{}' for MCP http transport",
                        url.scheme()
                    )));
                }
                Ok(TransportTarget::Http { url })
            }
        }
    }
}

impl std::fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportTarget::Stdio(target) => write!(f, "stdio:{}", target.command),
            TransportTarget::Http { url } => write!(f, "{}", url),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport handle
// ---------------------------------------------------------------------------

/// An open transport of either kind.
pub enum TransportHandle {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl TransportHandle {
    /// Open the channel described by `target`. HTTP performs no I/O here;
    /// the first request is the handshake.
    pub async fn open(target: &TransportTarget, http: &reqwest::Client) -> Result<Self, BridgeError> {
        match target {
            TransportTarget::Stdio(target) => Ok(TransportHandle::Stdio(StdioTransport::spawn(target)?)),
            TransportTarget::Http { url } => Ok(TransportHandle::Http(HttpTransport::new(
                http.clone(),
                url.clone(),
            ))),
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, BridgeError> {
        match self {
            TransportHandle::Stdio(t) => t.request(request).await,
            TransportHandle::Http(t) => t.request(request).await,
        }
    }

    /// Send a notification; no response is awaited.
    pub async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), BridgeError> {
        match self {
            TransportHandle::Stdio(t) => t.notify(notification).await,
            TransportHandle::Http(t) => t.notify(notification).await,
        }
    }

    /// Record the protocol revision the server agreed to.
    pub fn set_protocol_version(&mut self, version: &str) {
        if let TransportHandle::Http(t) = self {
            t.protocol_version = Some(version.to_string());
        }
    }

    /// Release the channel. Never fails; problems are logged.
    pub async fn close(self) {
        match self {
            TransportHandle::Stdio(t) => t.close().await,
            TransportHandle::Http(t) => t.close().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Stdio
// ---------------------------------------------------------------------------

/// Line-delimited JSON-RPC over a child process's stdio.
///
/// The child is killed if the transport is dropped without `close`.
pub struct StdioTransport {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl StdioTransport {
    /// Launch the server process
    pub fn spawn(target: &StdioTarget) -> Result<Self, BridgeError> {
        debug!(command = %target.command, args = ?target.args, "Spawning MCP server");

        let mut cmd = Command::new(&target.command);
        cmd.args(&target.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .env_clear();
        for key in DEFAULT_INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(&target.env);
        if let Some(dir) = &target.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::transport(format!("failed to spawn MCP server '{}': {}", target.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::transport("failed to capture MCP server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::transport("failed to capture MCP server stdout"))?;

        Ok(StdioTransport {
            command: target.command.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), BridgeError> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| BridgeError::transport(format!("failed to serialize message: {}", e)))?;
        debug!(server = %self.command, "MCP -> {}", json);
        json.push('\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BridgeError::transport("MCP server stdin already closed"))?;
        stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| BridgeError::transport(format!("failed to write to MCP server: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| BridgeError::transport(format!("failed to flush MCP server stdin: {}", e)))?;
        Ok(())
    }

    pub async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, BridgeError> {
        self.write_message(request).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| BridgeError::transport(format!("failed to read from MCP server: {}", e)))?;
            if read == 0 {
                return Err(BridgeError::transport(format!(
                    "MCP server '{}' closed stdout (process may have exited)",
                    self.command
                )));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(response) = match_response(trimmed, request.id) {
                debug!(server = %self.command, "MCP <- {}", trimmed);
                return Ok(response);
            }
            debug!(server = %self.command, "Skipping unrelated output: {}", trimmed);
        }
    }

    pub async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), BridgeError> {
        self.write_message(notification).await
    }

    /// Close stdin, give the server a moment to exit, then kill it.
    pub async fn close(mut self) {
        drop(self.stdin.take());
        match tokio::time::timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(server = %self.command, %status, "MCP server exited"),
            Ok(Err(e)) => debug!(server = %self.command, error = %e, "Failed to wait for MCP server"),
            Err(_) => {
                debug!(server = %self.command, "MCP server did not exit, killing");
                if let Err(e) = self.child.kill().await {
                    debug!(server = %self.command, error = %e, "Failed to kill MCP server");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Streamable HTTP
// ---------------------------------------------------------------------------

/// JSON-RPC over the MCP streamable HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    session_id: Option<String>,
    protocol_version: Option<String>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        HttpTransport {
            client,
            url,
            session_id: None,
            protocol_version: None,
        }
    }

    /// Session id issued by the server, if any
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<reqwest::Response, BridgeError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        if let Some(version) = &self.protocol_version {
            builder = builder.header(PROTOCOL_VERSION_HEADER, version);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BridgeError::transport(format!("POST {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::transport(format!(
                "MCP server at {} returned HTTP {}: {}",
                self.url,
                status,
                truncate(&body, 200)
            )));
        }
        Ok(response)
    }

    pub async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, BridgeError> {
        debug!(url = %self.url, method = %request.method, id = request.id, "MCP HTTP request");
        let response = self.post(request).await?;

        if let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("text/event-stream"));

        if is_event_stream {
            return read_event_stream(response, request.id).await;
        }

        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::transport(format!("failed to read MCP response body: {}", e)))?;
        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            BridgeError::transport(format!("MCP server returned invalid JSON: {} ({})", e, truncate(&body, 200)))
        })?;
        match_message(value, request.id).ok_or_else(|| {
            BridgeError::transport(format!("no response for request {} in MCP reply", request.id))
        })
    }

    pub async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), BridgeError> {
        debug!(url = %self.url, method = %notification.method, "MCP HTTP notification");
        self.post(notification).await.map(|_| ())
    }

    /// Terminate the server-side session, if one was issued.
    pub async fn close(self) {
        let Some(session_id) = self.session_id else {
            return;
        };
        let result = self
            .client
            .delete(self.url.clone())
            .header(SESSION_ID_HEADER, &session_id)
            .timeout(CLOSE_GRACE)
            .send()
            .await;
        match result {
            Ok(response) => debug!(url = %self.url, status = %response.status(), "Closed MCP session"),
            Err(e) => debug!(url = %self.url, error = %e, "Failed to close MCP session"),
        }
    }
}

/// Read SSE events until one carries the response to `id`.
async fn read_event_stream(response: reqwest::Response, id: u64) -> Result<JsonRpcResponse, BridgeError> {
    let mut stream = response.bytes_stream();
    let mut events = SseBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BridgeError::transport(format!("MCP event stream failed: {}", e)))?;
        for data in events.push(&chunk) {
            if let Some(response) = match_response(&data, id) {
                return Ok(response);
            }
            debug!("Skipping unrelated MCP event: {}", data);
        }
    }

    if let Some(data) = events.finish() {
        if let Some(response) = match_response(&data, id) {
            return Ok(response);
        }
    }

    Err(BridgeError::transport(format!(
        "MCP event stream ended without a response to request {}",
        id
    )))
}

/// Incremental server-sent-events decoder yielding `data` payloads.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseBuffer {
    /// Feed bytes; returns the data of every event completed by them.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut completed = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.take_line(line.trim_end_matches(&['\n', '\r'][..])) {
                completed.push(event);
            }
        }
        completed
    }

    /// Flush a trailing event not followed by a blank line.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw).trim_end().to_string();
            self.take_line(&line);
        }
        self.take_line("")
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let event = self.data.join("\n");
            self.data.clear();
            return Some(event);
        }
        // `event:`, `id:`, `retry:` and comments carry nothing we need
        if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
