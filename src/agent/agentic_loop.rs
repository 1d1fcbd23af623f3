//! Agent tool-calling loop.
//!
//! Alternates between asking the completion client for the next assistant
//! turn and running the tool calls it requests through the bridge, until the
//! model produces a final answer or the iteration budget runs out.
//!
//! Each turn is reduced to a [`TurnOutcome`] and the loop reacts to that tag
//! alone:
//!
//! | Outcome       | Effect                                             |
//! |---------------|----------------------------------------------------|
//! | `Final`       | stop with [`LoopOutcome::Done`]                    |
//! | `ToolCalls`   | run the calls, append one TOOL message per call    |
//! | `Incomplete`  | next turn                                          |
//! | `Recoverable` | append a SYSTEM note about the parse error         |
//! | `Fatal`       | return the completion error                        |

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::completion::{CompletionClient, CompletionConfig, CompletionError, Usage};
use crate::agent::tooling::{execute_tool_calls, format_tool_result};
use crate::agent::types::{Conversation, Message, ToolCall};
use crate::config::AgentSettings;
use crate::error::{Error, Result};
use crate::mcp::{ToolBridge, ToolCallRecord};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Limits for one loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum completion turns, at least 1
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        AgentLoopConfig {
            max_iterations: default_max_iterations(),
        }
    }
}

impl AgentLoopConfig {
    pub fn with_max_iterations(max_iterations: u32) -> Self {
        AgentLoopConfig { max_iterations }
    }
}

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Everything one run needs apart from the client and the bridge
#[derive(Debug, Clone)]
pub struct AgentLoopPayload {
    /// Seed conversation, usually from `build_conversation`
    pub conversation: Conversation,
    pub completion_config: CompletionConfig,
    pub loop_config: AgentLoopConfig,
    pub agent_settings: AgentSettings,
}

/// How the loop finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopOutcome {
    /// The model produced a final answer.
    Done,
    /// The iteration budget ran out first.
    Failed,
}

/// Result of a run. A `Failed` result still carries everything gathered.
#[derive(Debug, Clone)]
pub struct AgentLoopResult {
    pub conversation: Conversation,
    pub tool_call_log: Vec<ToolCallRecord>,
    pub outcome: LoopOutcome,
    /// Completion turns taken
    pub iterations: u32,
    /// Token usage summed over every turn that reported it
    pub total_usage: Usage,
}

impl AgentLoopResult {
    pub fn is_done(&self) -> bool {
        self.outcome == LoopOutcome::Done
    }

    /// Content of the final assistant message when the run finished
    pub fn final_answer(&self) -> Option<&str> {
        if !self.is_done() {
            return None;
        }
        self.conversation
            .last_assistant_message()
            .map(|message| message.content.as_str())
    }
}

/// Classification of a single completion turn
#[derive(Debug)]
pub enum TurnOutcome {
    /// No tool calls, non-empty content
    Final,
    /// Tool calls to run before the next turn
    ToolCalls(Vec<ToolCall>),
    /// No tool calls, empty content
    Incomplete,
    /// The response could not be parsed; carries the error text
    Recoverable(String),
    /// Any other completion failure
    Fatal(CompletionError),
}

impl TurnOutcome {
    /// Classify a successful turn. Tool calls are ignored when tools are
    /// disabled.
    pub fn classify(message: &Message, tool_calls: &[ToolCall], enable_tools: bool) -> Self {
        if enable_tools && !tool_calls.is_empty() {
            return TurnOutcome::ToolCalls(tool_calls.to_vec());
        }
        if message.content.trim().is_empty() {
            TurnOutcome::Incomplete
        } else {
            TurnOutcome::Final
        }
    }

    /// Classify a failed turn
    pub fn from_error(error: CompletionError) -> Self {
        if error.is_parse_error() {
            TurnOutcome::Recoverable(error.to_string())
        } else {
            TurnOutcome::Fatal(error)
        }
    }
}

// ---------------------------------------------------------------------------
// Callback trait
// ---------------------------------------------------------------------------

/// Hooks for callers that want progress (CLI output, metrics, etc.).
#[async_trait]
pub trait LoopCallback: Send + Sync {
    /// Called before each completion request.
    async fn on_iteration_start(&self, _iteration: u32) {}
    /// Called after each tool call, successful or not.
    async fn on_tool_executed(&self, _record: &ToolCallRecord) {}
    /// Called once when the loop returns a result.
    async fn on_loop_complete(&self, _result: &AgentLoopResult) {}
}

/// Default no-op callback.
pub struct NoOpCallback;

#[async_trait]
impl LoopCallback for NoOpCallback {}

// ---------------------------------------------------------------------------
// Core loop implementation
// ---------------------------------------------------------------------------

/// Drives a conversation through a completion client and a tool bridge
pub struct AgentLoop {
    client: Arc<dyn CompletionClient>,
    bridge: Arc<dyn ToolBridge>,
    callback: Arc<dyn LoopCallback>,
}

impl AgentLoop {
    pub fn new(client: Arc<dyn CompletionClient>, bridge: Arc<dyn ToolBridge>) -> Self {
        AgentLoop {
            client,
            bridge,
            callback: Arc::new(NoOpCallback),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn LoopCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Run the loop. Only non-parse completion errors and an invalid budget
    /// are errors; running out of iterations is a `Failed` result.
    pub async fn run(&self, payload: AgentLoopPayload) -> Result<AgentLoopResult> {
        let AgentLoopPayload {
            mut conversation,
            mut completion_config,
            loop_config,
            agent_settings,
        } = payload;

        if loop_config.max_iterations == 0 {
            return Err(Error::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let enable_tools = agent_settings.enable_tools;
        if !enable_tools {
            completion_config.available_tools.clear();
        }

        let session_id = conversation.conversation_id.clone();
        let loop_start = Instant::now();
        let mut tool_call_log: Vec<ToolCallRecord> = Vec::new();
        let mut total_usage = Usage::default();
        let mut iterations: u32 = 0;
        let mut outcome = LoopOutcome::Failed;

        while iterations < loop_config.max_iterations {
            iterations += 1;
            info!(
                agent = %agent_settings.agent_name,
                iteration = iterations,
                max_iterations = loop_config.max_iterations,
                "Agent loop iteration"
            );
            self.callback.on_iteration_start(iterations).await;

            let turn = match self.client.generate(&conversation, &completion_config).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        accumulate_usage(&mut total_usage, usage);
                    }
                    debug!(
                        finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
                        tool_calls = response.tool_calls.len(),
                        "Completion received"
                    );
                    let turn = TurnOutcome::classify(&response.message, &response.tool_calls, enable_tools);
                    conversation = response.conversation;
                    turn
                }
                Err(e) => TurnOutcome::from_error(e),
            };

            match turn {
                // --- Final answer ------------------------------------------
                TurnOutcome::Final => {
                    info!(iteration = iterations, "Agent produced a final answer");
                    outcome = LoopOutcome::Done;
                    break;
                }

                // --- Empty turn --------------------------------------------
                TurnOutcome::Incomplete => {
                    warn!(iteration = iterations, "Completion had no content and no tool calls");
                }

                // --- Unparseable response ----------------------------------
                TurnOutcome::Recoverable(reason) => {
                    warn!(iteration = iterations, error = %reason, "Recovering from completion parse error");
                    conversation = conversation.with_message(Message::system(parse_error_notice(&reason)));
                }

                // --- Unrecoverable completion failure ----------------------
                TurnOutcome::Fatal(e) => {
                    warn!(iteration = iterations, error = %e, "Completion failed");
                    return Err(Error::Completion(e));
                }

                // --- Tool calls --------------------------------------------
                TurnOutcome::ToolCalls(calls) => {
                    info!(
                        iteration = iterations,
                        count = calls.len(),
                        "Executing requested tool calls"
                    );
                    let records = execute_tool_calls(self.bridge.as_ref(), &calls, Some(&session_id)).await;

                    let mut tool_messages = Vec::with_capacity(records.len());
                    for record in records {
                        if record.response.is_error() {
                            warn!(tool = %record.request.tool_name, call_id = %record.request.tool_call_id, "Tool call returned an error");
                        }
                        self.callback.on_tool_executed(&record).await;
                        tool_messages.push(Message::tool(
                            record.request.tool_call_id.clone(),
                            format_tool_result(&record.response),
                        ));
                        tool_call_log.push(record);
                    }
                    conversation = conversation.with_messages(tool_messages);
                }
            }
        }

        if outcome == LoopOutcome::Failed {
            warn!(
                iterations,
                tool_calls = tool_call_log.len(),
                "Agent loop exhausted its iteration budget"
            );
        }

        let result = AgentLoopResult {
            conversation,
            tool_call_log,
            outcome,
            iterations,
            total_usage,
        };
        info!(
            outcome = ?result.outcome,
            iterations = result.iterations,
            elapsed_ms = loop_start.elapsed().as_millis() as u64,
            "Agent loop finished"
        );
        self.callback.on_loop_complete(&result).await;
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_error_notice(reason: &str) -> String {
    format!(
        "The previous response could not be processed ({reason}). \
         Reply again with plain text or well-formed tool calls."
    )
}

fn accumulate_usage(total: &mut Usage, delta: &Usage) {
    total.prompt_tokens += delta.prompt_tokens;
    total.completion_tokens += delta.completion_tokens;
    total.total_tokens += delta.total_tokens;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::agent::conversation::build_conversation;
    use crate::agent::tooling::testing::StubBridge;
    use crate::agent::types::Role;
    use crate::agent::CompletionResponse;

    /// Replies from a script, then repeats `fallback` forever.
    struct ScriptedClient {
        script: Mutex<VecDeque<std::result::Result<Message, CompletionError>>>,
        fallback: Option<Message>,
        seen_tools: Mutex<Vec<usize>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<std::result::Result<Message, CompletionError>>) -> Self {
            ScriptedClient {
                script: Mutex::new(script.into()),
                fallback: None,
                seen_tools: Mutex::new(Vec::new()),
            }
        }

        fn repeating(message: Message) -> Self {
            ScriptedClient {
                fallback: Some(message),
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn generate(
            &self,
            conversation: &Conversation,
            config: &CompletionConfig,
        ) -> std::result::Result<CompletionResponse, CompletionError> {
            self.seen_tools.lock().unwrap().push(config.available_tools.len());
            let next = self.script.lock().unwrap().pop_front();
            let message = match next {
                Some(reply) => reply?,
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| CompletionError::Api { status: 500, message: "script exhausted".into() })?,
            };
            let mut response = CompletionResponse::from_message(conversation, message);
            response.usage = Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            });
            Ok(response)
        }
    }

    #[derive(Default)]
    struct CountingCallback {
        started: AtomicU32,
        tools: AtomicU32,
        completed: AtomicU32,
    }

    #[async_trait]
    impl LoopCallback for CountingCallback {
        async fn on_iteration_start(&self, _iteration: u32) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_tool_executed(&self, _record: &ToolCallRecord) {
            self.tools.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_loop_complete(&self, _result: &AgentLoopResult) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tool_request(call_id: &str, name: &str, args: serde_json::Value) -> Message {
        let call = ToolCall::new(call_id, name, args.as_object().cloned().unwrap_or_default());
        Message::assistant("").with_tool_calls(vec![call])
    }

    fn payload(conversation: Conversation, max_iterations: u32, enable_tools: bool) -> AgentLoopPayload {
        let mut agent_settings = AgentSettings::with_tools("math-agent");
        agent_settings.enable_tools = enable_tools;
        AgentLoopPayload {
            conversation,
            completion_config: CompletionConfig::default(),
            loop_config: AgentLoopConfig::with_max_iterations(max_iterations),
            agent_settings,
        }
    }

    fn seed() -> Conversation {
        build_conversation(None, "What is 1+2?", Some("You are a calculator."), None)
    }

    fn roles(conversation: &Conversation) -> Vec<Role> {
        conversation.messages.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn test_sum_end_to_end() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_request("call_1", "sum", json!({"a": 1, "b": 2}))),
            Ok(Message::assistant("3")),
        ]));
        let bridge = Arc::new(StubBridge::math());
        let agent = AgentLoop::new(client, bridge.clone());

        let conversation = seed();
        let conversation_id = conversation.conversation_id.clone();
        let result = agent.run(payload(conversation, 5, true)).await.unwrap();

        assert_eq!(result.outcome, LoopOutcome::Done);
        assert_eq!(result.iterations, 2);
        assert_eq!(
            roles(&result.conversation),
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(result.final_answer(), Some("3"));

        let tool_message = &result.conversation.messages[3];
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(
            tool_message.content,
            serde_json::to_string_pretty(&json!({"result": 3})).unwrap()
        );

        assert_eq!(result.tool_call_log.len(), 1);
        let record = &result.tool_call_log[0];
        assert_eq!(record.request.tool_name, "sum");
        assert_eq!(record.response.session_id.as_deref(), Some(conversation_id.as_str()));
        assert_eq!(bridge.invoked(), vec!["sum"]);
        assert_eq!(result.total_usage.total_tokens, 24);
    }

    #[tokio::test]
    async fn test_terminates_after_max_iterations() {
        let client = Arc::new(ScriptedClient::repeating(tool_request("call_r", "random", json!({}))));
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math()));

        let conversation = seed();
        let seed_len = conversation.len();
        let result = agent.run(payload(conversation, 3, true)).await.unwrap();

        assert_eq!(result.outcome, LoopOutcome::Failed);
        assert_eq!(result.iterations, 3);
        assert!(result.conversation.len() <= seed_len + 2 * 3);
        assert_eq!(result.tool_call_log.len(), 3);
        assert!(result.final_answer().is_none());
    }

    #[tokio::test]
    async fn test_zero_iterations_rejected() {
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math()));
        let err = agent.run(payload(seed(), 0, true)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_parse_error_is_recovered() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(CompletionError::Parse("missing choices".into())),
            Ok(Message::assistant("3")),
        ]));
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math()));

        let result = agent.run(payload(seed(), 5, true)).await.unwrap();

        assert!(result.is_done());
        assert_eq!(result.iterations, 2);
        assert_eq!(
            roles(&result.conversation),
            vec![Role::System, Role::User, Role::System, Role::Assistant]
        );
        assert!(result.conversation.messages[2].content.contains("missing choices"));
    }

    #[tokio::test]
    async fn test_fatal_error_propagates() {
        let client = Arc::new(ScriptedClient::new(vec![Err(CompletionError::Api {
            status: 401,
            message: "bad key".into(),
        })]));
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math()));

        let err = agent.run(payload(seed(), 5, true)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Completion(CompletionError::Api { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_turn_continues() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(Message::assistant("   ")),
            Ok(Message::assistant("done")),
        ]));
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math()));

        let result = agent.run(payload(seed(), 5, true)).await.unwrap();
        assert!(result.is_done());
        assert_eq!(result.iterations, 2);
        assert_eq!(result.final_answer(), Some("done"));
    }

    #[tokio::test]
    async fn test_bridge_error_reaches_model() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_request("call_g", "ghost", json!({}))),
            Ok(Message::assistant("That tool does not exist.")),
        ]));
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math()));

        let result = agent.run(payload(seed(), 5, true)).await.unwrap();

        assert!(result.is_done());
        assert_eq!(result.tool_call_log.len(), 1);
        assert!(result.tool_call_log[0].response.is_error());
        let tool_message = &result.conversation.messages[3];
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.content.contains("ghost"));
    }

    #[tokio::test]
    async fn test_disabled_tools_are_not_executed() {
        let request = tool_request("call_1", "sum", json!({"a": 1, "b": 2}));
        let request = Message {
            content: "I would add them.".into(),
            ..request
        };
        let client = Arc::new(ScriptedClient::new(vec![Ok(request)]));
        let bridge = Arc::new(StubBridge::math());
        let agent = AgentLoop::new(client.clone(), bridge.clone());

        let mut payload = payload(seed(), 5, false);
        payload.completion_config.available_tools = bridge.tools.clone();
        let result = agent.run(payload).await.unwrap();

        assert!(result.is_done());
        assert_eq!(result.iterations, 1);
        assert!(result.tool_call_log.is_empty());
        assert!(bridge.invoked().is_empty());
        assert_eq!(*client.seen_tools.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_callback_sees_every_step() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_request("call_1", "sum", json!({"a": 2, "b": 2}))),
            Ok(Message::assistant("4")),
        ]));
        let callback = Arc::new(CountingCallback::default());
        let agent = AgentLoop::new(client, Arc::new(StubBridge::math())).with_callback(callback.clone());

        agent.run(payload(seed(), 5, true)).await.unwrap();

        assert_eq!(callback.started.load(Ordering::SeqCst), 2);
        assert_eq!(callback.tools.load(Ordering::SeqCst), 1);
        assert_eq!(callback.completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classify_turns() {
        let call = ToolCall::new("c", "sum", Default::default());
        let with_calls = Message::assistant("").with_tool_calls(vec![call.clone()]);

        assert!(matches!(
            TurnOutcome::classify(&with_calls, &[call.clone()], true),
            TurnOutcome::ToolCalls(calls) if calls.len() == 1
        ));
        assert!(matches!(
            TurnOutcome::classify(&with_calls, &[call], false),
            TurnOutcome::Incomplete
        ));
        assert!(matches!(
            TurnOutcome::classify(&Message::assistant("hi"), &[], true),
            TurnOutcome::Final
        ));
        assert!(matches!(
            TurnOutcome::from_error(CompletionError::Parse("x".into())),
            TurnOutcome::Recoverable(_)
        ));
    }

    #[test]
    fn test_accumulate_usage() {
        let mut total = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let delta = Usage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        };
        accumulate_usage(&mut total, &delta);
        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 15);
        assert_eq!(total.total_tokens, 45);
    }
}
