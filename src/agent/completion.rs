//! Completion client interface
//!
//! The agent loop only needs `generate`; the concrete client lives in
//! `client.rs`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agent::types::{Conversation, Message, ToolCall};
use crate::mcp::ToolDescriptor;

/// Errors from a completion client
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The provider answered, but the answer could not be interpreted.
    /// The agent loop recovers from this one.
    #[error("failed to parse completion response: {0}")]
    Parse(String),

    /// Non-success status from the provider
    #[error("completion API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network or protocol failure
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl CompletionError {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, CompletionError::Parse(_))
    }

    /// Rate limits, server errors and network failures
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Http(_) => true,
            CompletionError::Parse(_) => false,
        }
    }
}

/// Per-request completion settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Provider tool choice, e.g. `"auto"` or a forced function
    #[serde(default)]
    pub tool_choice: Option<Value>,
    /// Tools offered to the model
    #[serde(default)]
    pub available_tools: Vec<ToolDescriptor>,
}

impl CompletionConfig {
    /// Fields set on `self` win; unset ones fall back to `defaults`.
    pub fn merge(&self, defaults: &CompletionConfig) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone().or_else(|| defaults.model.clone()),
            temperature: self.temperature.or(defaults.temperature),
            max_output_tokens: self.max_output_tokens.or(defaults.max_output_tokens),
            tool_choice: self.tool_choice.clone().or_else(|| defaults.tool_choice.clone()),
            available_tools: if self.available_tools.is_empty() {
                defaults.available_tools.clone()
            } else {
                self.available_tools.clone()
            },
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.available_tools = tools;
        self
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One model turn
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// The assistant message, including any tool calls
    pub message: Message,
    pub tool_calls: Vec<ToolCall>,
    /// Input conversation with `message` appended
    pub conversation: Conversation,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Response for `message`, appended to `conversation`
    pub fn from_message(conversation: &Conversation, message: Message) -> Self {
        CompletionResponse {
            tool_calls: message.tool_calls.clone(),
            conversation: conversation.with_message(message.clone()),
            message,
            finish_reason: None,
            usage: None,
        }
    }
}

/// A language model that produces the next assistant turn
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(
        &self,
        conversation: &Conversation,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_prefers_request_values() {
        let defaults = CompletionConfig {
            model: Some("default-model".into()),
            temperature: Some(0.2),
            available_tools: vec![ToolDescriptor::new("sum", "Add")],
            ..Default::default()
        };
        let request = CompletionConfig {
            temperature: Some(0.9),
            tool_choice: Some(json!("auto")),
            ..Default::default()
        };

        let merged = request.merge(&defaults);
        assert_eq!(merged.model.as_deref(), Some("default-model"));
        assert_eq!(merged.temperature, Some(0.9));
        assert_eq!(merged.tool_choice, Some(json!("auto")));
        assert_eq!(merged.available_tools.len(), 1);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(CompletionError::Api { status: 429, message: "slow down".into() }.is_retryable());
        assert!(CompletionError::Api { status: 503, message: "busy".into() }.is_retryable());
        assert!(!CompletionError::Api { status: 400, message: "bad".into() }.is_retryable());
        assert!(!CompletionError::Parse("garbage".into()).is_retryable());
        assert!(CompletionError::Parse("garbage".into()).is_parse_error());
    }

    #[test]
    fn test_response_from_message_appends() {
        let conversation = Conversation::with_id("c").with_message(Message::user("hi"));
        let response = CompletionResponse::from_message(&conversation, Message::assistant("hello"));
        assert_eq!(response.conversation.len(), 2);
        assert_eq!(conversation.len(), 1);
        assert!(response.tool_calls.is_empty());
    }
}
