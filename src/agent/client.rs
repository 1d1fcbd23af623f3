//! OpenAI-compatible chat completions client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::agent::completion::{
    CompletionClient, CompletionConfig, CompletionError, CompletionResponse, Usage,
};
use crate::agent::types::{Conversation, Message, Role, ToolCall};
use crate::config::ModelClientSettings;
use crate::error::{Error, Result};
use crate::mcp::{generate_call_id, ToolDescriptor};

/// Client for any `/chat/completions` endpoint speaking the OpenAI format
#[derive(Clone)]
pub struct OpenAiCompatClient {
    /// HTTP client
    client: Client,
    /// Endpoint base, without trailing slash
    api_base: String,
    /// Applied beneath every request's config
    defaults: CompletionConfig,
}

impl OpenAiCompatClient {
    /// Create a client; `api_key` is sent as a bearer token when present
    pub fn new(settings: &ModelClientSettings, api_key: Option<SecretString>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        if let Some(key) = api_key {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                    .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
            );
        }

        for (name, value) in &settings.extra_headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let timeout = Duration::try_from_secs_f64(settings.timeout_seconds)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| {
                Error::Config(format!(
                    "model.timeout_seconds must be a positive number of seconds, got {}",
                    settings.timeout_seconds
                ))
            })?;

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(OpenAiCompatClient {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            defaults: CompletionConfig {
                model: Some(settings.default_model.clone()),
                ..Default::default()
            },
        })
    }

    /// Create a client, reading the API key named by `api_key_env` from `env`
    pub fn from_settings(
        settings: &ModelClientSettings,
        env: &std::collections::HashMap<String, String>,
    ) -> Result<Self> {
        Self::new(settings, settings.resolve_api_key(env))
    }

    fn build_request(&self, conversation: &Conversation, config: &CompletionConfig) -> ChatCompletionRequest {
        let config = config.merge(&self.defaults);
        let tools: Vec<ToolDefinition> = config.available_tools.iter().map(ToolDefinition::from).collect();

        ChatCompletionRequest {
            model: config.model.unwrap_or_default(),
            messages: conversation.messages.iter().map(ChatMessage::from).collect(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            tool_choice: if tools.is_empty() { None } else { config.tool_choice },
            tools,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn generate(
        &self,
        conversation: &Conversation,
        config: &CompletionConfig,
    ) -> std::result::Result<CompletionResponse, CompletionError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(conversation, config);

        debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "Sending completion request");

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::Parse(format!("invalid response body: {}", e)))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::Parse("response contained no choices".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ToolCall::from)
            .collect();
        let message = Message::assistant(choice.message.content.unwrap_or_default()).with_tool_calls(tool_calls);

        if let Some(usage) = &parsed.usage {
            info!(
                model = parsed.model.as_deref().unwrap_or(&request.model),
                tokens = usage.total_tokens,
                "Completion received"
            );
        }

        let mut result = CompletionResponse::from_message(conversation, message);
        result.finish_reason = choice.finish_reason;
        result.usage = parsed.usage;
        Ok(result)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: Role,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<AssistantToolCall>>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let tool_calls: Vec<AssistantToolCall> = message.tool_calls.iter().map(AssistantToolCall::from).collect();
        // Assistant turns that only call tools carry null content
        let content = if message.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(message.content.clone())
        };
        ChatMessage {
            role: message.role,
            content,
            tool_call_id: message.tool_call_id.clone(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssistantToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded string on the wire; some servers send an object
    #[serde(default)]
    arguments: Value,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for AssistantToolCall {
    fn from(call: &ToolCall) -> Self {
        AssistantToolCall {
            id: Some(call.call_id.clone()),
            call_type: function_type(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: Value::String(Value::Object(call.arguments.clone()).to_string()),
            },
        }
    }
}

impl From<AssistantToolCall> for ToolCall {
    fn from(call: AssistantToolCall) -> Self {
        ToolCall {
            call_id: call.id.filter(|id| !id.is_empty()).unwrap_or_else(generate_call_id),
            name: call.function.name,
            arguments: parse_arguments(call.function.arguments),
        }
    }
}

/// Arguments as an object; anything unparseable is kept under `raw`.
fn parse_arguments(arguments: Value) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(text) if text.trim().is_empty() => Map::new(),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut raw = Map::new();
                raw.insert("raw".to_string(), Value::String(text));
                raw
            }
        },
        other => {
            let mut raw = Map::new();
            raw.insert("raw".to_string(), other);
            raw
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDescriptor> for ToolDefinition {
    fn from(tool: &ToolDescriptor) -> Self {
        let parameters = match &tool.input_schema {
            Value::Object(map) if !map.is_empty() => tool.input_schema.clone(),
            _ => serde_json::json!({"type": "object", "properties": {}}),
        };
        ToolDefinition {
            tool_type: "function",
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}
