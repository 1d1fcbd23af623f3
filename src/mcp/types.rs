//! Bridge data model: tool descriptors, invocations and normalized results.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::errors::BridgeError;
use super::protocol::{CallToolResult, McpTool, McpToolAnnotations};

/// Behaviour hints published with a tool. All fields are hints only.
pub type ToolAnnotations = McpToolAnnotations;

/// Describes a tool published by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments
    #[serde(default = "empty_object")]
    pub input_schema: Value,
    /// JSON Schema for `structured_content`, when the tool declares one
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub annotations: Option<ToolAnnotations>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl ToolDescriptor {
    /// Minimal descriptor, mostly useful in tests and stubs
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolDescriptor {
            name: name.into(),
            title: None,
            description: Some(description.into()),
            input_schema: empty_object(),
            output_schema: None,
            annotations: None,
            metadata: Map::new(),
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

impl From<McpTool> for ToolDescriptor {
    fn from(tool: McpTool) -> Self {
        let input_schema = match tool.input_schema {
            Some(Value::Object(schema)) => Value::Object(schema),
            _ => empty_object(),
        };
        ToolDescriptor {
            name: tool.name,
            title: tool.title,
            description: tool.description,
            input_schema,
            output_schema: tool.output_schema,
            annotations: tool.annotations,
            metadata: tool.meta.unwrap_or_default(),
        }
    }
}

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Caller correlation id; generated when absent
    #[serde(default)]
    pub call_id: Option<String>,
    /// Logical conversation id, not a transport session
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        ToolInvocation {
            tool_name: tool_name.into(),
            arguments,
            call_id: None,
            session_id: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// The caller's call id, or a freshly generated one.
    pub fn resolved_call_id(&self) -> String {
        self.call_id.clone().unwrap_or_else(generate_call_id)
    }
}

/// `call_` followed by the last 10 hex digits of a v4 UUID.
pub fn generate_call_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[hex.len() - 10..])
}

/// Outcome of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecutionStatus {
    Success,
    Error,
}

/// Normalized result of calling a tool through MCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolExecutionStatus,
    /// Content blocks, verbatim from the wire
    #[serde(default)]
    pub content: Vec<Value>,
    /// Preferred machine-readable payload
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Raw wire payload, diagnostics only
    #[serde(default)]
    pub raw_result: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ToolExecutionResult {
    /// Successful result carrying only content blocks
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Vec<Value>,
    ) -> Self {
        ToolExecutionResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolExecutionStatus::Success,
            content,
            structured_content: None,
            error_message: None,
            raw_result: None,
            session_id: None,
        }
    }

    /// Failed result; `error_message` is always set.
    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        ToolExecutionResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolExecutionStatus::Error,
            content: Vec::new(),
            structured_content: None,
            error_message: Some(error_message.into()),
            raw_result: None,
            session_id: None,
        }
    }

    pub fn with_structured_content(mut self, structured: Value) -> Self {
        self.structured_content = Some(structured);
        self
    }

    /// Map a `tools/call` wire result.
    pub fn from_wire(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        raw: Value,
    ) -> Result<Self, BridgeError> {
        let tool_name = tool_name.into();
        let parsed: CallToolResult =
            serde_json::from_value(raw.clone()).map_err(|e| BridgeError::Protocol {
                code: -32602,
                message: format!("malformed tools/call result for '{}': {}", tool_name, e),
                data: Some(raw.clone()),
            })?;

        let (status, error_message) = if parsed.is_error {
            let message = parsed
                .content
                .iter()
                .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .and_then(|block| block.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| format!("tool '{}' reported an error", tool_name));
            (ToolExecutionStatus::Error, Some(message))
        } else {
            (ToolExecutionStatus::Success, None)
        };

        Ok(ToolExecutionResult {
            call_id: call_id.into(),
            tool_name,
            status,
            content: parsed.content,
            structured_content: parsed.structured_content,
            error_message,
            raw_result: Some(raw),
            session_id: None,
        })
    }

    /// Turn a dispatch failure into data the model can read.
    pub fn from_bridge_error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        err: &BridgeError,
    ) -> Self {
        let mut result = Self::failure(call_id, tool_name, err.to_string());
        result.raw_result = Some(json!({
            "error": err.to_string(),
            "details": err.details(),
        }));
        result
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolExecutionStatus::Error
    }

    /// Text for a TOOL message: pretty JSON of the structured payload,
    /// else of the raw result, else of the content blocks.
    pub fn to_message_content(&self) -> String {
        let value = self
            .structured_content
            .as_ref()
            .or(self.raw_result.as_ref())
            .cloned()
            .unwrap_or_else(|| Value::Array(self.content.clone()));
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

/// Captured request details for a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequestLog {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// One executed call: request paired with its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub request: ToolCallRequestLog,
    pub response: ToolExecutionResult,
}
