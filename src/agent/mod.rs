//! Agent module - conversation building, prompts, and the tool-calling loop
//!
//! This module handles:
//! - Conversation and message types
//! - Tool prompt rendering from the bridge catalog
//! - The completion client interface and an OpenAI-compatible client
//! - The agent loop that runs requested tools through a `ToolBridge`

pub mod agentic_loop;
mod client;
mod completion;
mod conversation;
pub mod prompts;
mod tooling;
mod types;

pub use agentic_loop::{
    AgentLoop, AgentLoopConfig, AgentLoopPayload, AgentLoopResult, LoopCallback, LoopOutcome,
    NoOpCallback, TurnOutcome,
};
pub use client::OpenAiCompatClient;
pub use completion::{CompletionClient, CompletionConfig, CompletionError, CompletionResponse, Usage};
pub use conversation::build_conversation;
pub use prompts::{
    build_tool_prompt, create_agent_config, format_tool_descriptions, render_prompt, AgentConfig,
    PromptTemplate, TOOL_DESCRIPTIONS_PLACEHOLDER,
};
pub use tooling::{execute_tool_calls, format_tool_result, resolve_tool_prompt, resolve_tools};
pub use types::*;
