//! Helpers connecting the agent to a `ToolBridge`

use tracing::{error, warn};

use crate::agent::prompts::build_tool_prompt;
use crate::agent::types::ToolCall;
use crate::config::AgentSettings;
use crate::mcp::{
    ToolBridge, ToolCallRecord, ToolCallRequestLog, ToolDescriptor, ToolExecutionResult, ToolInvocation,
};

/// Tools the agent may use: the bridge catalog, filtered by `allowed_tools`
/// when it is non-empty. Listing failures yield an empty list.
pub async fn resolve_tools(bridge: &dyn ToolBridge, allowed_tools: &[String]) -> Vec<ToolDescriptor> {
    match bridge.list_tools().await {
        Ok(tools) if allowed_tools.is_empty() => tools,
        Ok(tools) => tools
            .into_iter()
            .filter(|tool| allowed_tools.iter().any(|allowed| allowed == &tool.name))
            .collect(),
        Err(e) => {
            warn!(error = %e, details = %e.details(), "Failed to list MCP tools");
            Vec::new()
        }
    }
}

/// Tool list and tool prompt for an agent. Tools are resolved whenever
/// `enable_tools` is set; the prompt additionally needs a template.
pub async fn resolve_tool_prompt(
    bridge: &dyn ToolBridge,
    settings: &AgentSettings,
) -> (Option<String>, Vec<ToolDescriptor>) {
    if !settings.enable_tools {
        return (None, Vec::new());
    }

    let tools = resolve_tools(bridge, &settings.allowed_tools).await;
    let prompt = build_tool_prompt(
        &tools,
        settings.tool_prompt_template.as_deref(),
        settings.include_tool_schemas_in_prompt,
    );
    (prompt, tools)
}

/// Run `calls` in order. A call that cannot be dispatched becomes an ERROR
/// result carrying the bridge error.
pub async fn execute_tool_calls(
    bridge: &dyn ToolBridge,
    calls: &[ToolCall],
    session_id: Option<&str>,
) -> Vec<ToolCallRecord> {
    let mut records = Vec::with_capacity(calls.len());
    for call in calls {
        let invocation = ToolInvocation::new(&call.name, call.arguments.clone())
            .with_call_id(&call.call_id)
            .with_session_id(session_id.map(str::to_string));

        let response = match bridge.call_tool(invocation).await {
            Ok(result) => result,
            Err(e) => {
                error!(tool = %call.name, call_id = %call.call_id, error = %e, "MCP tool dispatch failed");
                let mut result = ToolExecutionResult::from_bridge_error(&call.call_id, &call.name, &e);
                result.session_id = session_id.map(str::to_string);
                result
            }
        };

        records.push(ToolCallRecord {
            request: ToolCallRequestLog {
                tool_call_id: response.call_id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
            response,
        });
    }
    records
}

/// Content of the TOOL message answering a call
pub fn format_tool_result(result: &ToolExecutionResult) -> String {
    result.to_message_content()
}


#[cfg(test)]
mod tests {
    use super::testing::StubBridge;
    use super::*;
    use crate::config::DEFAULT_TOOL_PROMPT_TEMPLATE;
    use crate::mcp::BridgeError;
    use serde_json::json;

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, name, args.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_resolve_tools_applies_allowlist() {
        let bridge = StubBridge::math();
        let all = resolve_tools(&bridge, &[]).await;
        assert_eq!(all.len(), 2);

        let only_sum = resolve_tools(&bridge, &["sum".to_string()]).await;
        assert_eq!(only_sum.len(), 1);
        assert_eq!(only_sum[0].name, "sum");
    }

    #[tokio::test]
    async fn test_resolve_tools_swallows_errors() {
        let mut bridge = StubBridge::math();
        bridge.list_error = Some(BridgeError::transport("connection refused"));
        assert!(resolve_tools(&bridge, &[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_tool_prompt() {
        let bridge = StubBridge::math();

        let disabled = AgentSettings::default();
        let (prompt, tools) = resolve_tool_prompt(&bridge, &disabled).await;
        assert!(prompt.is_none());
        assert!(tools.is_empty());

        let settings = AgentSettings::with_tools("math-agent");
        let (prompt, tools) = resolve_tool_prompt(&bridge, &settings).await;
        let prompt = prompt.unwrap();
        assert_eq!(tools.len(), 2);
        assert!(prompt.starts_with(DEFAULT_TOOL_PROMPT_TEMPLATE.split('\n').next().unwrap()));
        assert!(prompt.contains("- sum: Add two numbers"));
        assert!(!prompt.contains("{{tool_descriptions}}"));
    }

    #[tokio::test]
    async fn test_tools_resolved_without_prompt_template() {
        let bridge = StubBridge::math();
        let settings = AgentSettings {
            enable_tools: true,
            tool_prompt_template: None,
            ..AgentSettings::default()
        };

        let (prompt, tools) = resolve_tool_prompt(&bridge, &settings).await;
        assert!(prompt.is_none());
        assert_eq!(tools.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_tool_calls_in_order() {
        let bridge = StubBridge::math();
        let calls = vec![
            call("call_a", "random", json!({})),
            call("call_b", "sum", json!({"a": 1, "b": 2})),
        ];

        let records = execute_tool_calls(&bridge, &calls, Some("conv-1")).await;

        assert_eq!(bridge.invoked(), vec!["random", "sum"]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].request.tool_call_id, "call_b");
        assert_eq!(records[1].request.arguments["a"], 1);
        assert_eq!(records[1].response.session_id.as_deref(), Some("conv-1"));
        assert_eq!(
            format_tool_result(&records[1].response),
            serde_json::to_string_pretty(&json!({"result": 3})).unwrap()
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_becomes_error_record() {
        let bridge = StubBridge::math();
        let records = execute_tool_calls(&bridge, &[call("call_x", "ghost", json!({}))], None).await;

        assert_eq!(records.len(), 1);
        let response = &records[0].response;
        assert!(response.is_error());
        assert_eq!(response.call_id, "call_x");
        assert_eq!(response.raw_result.as_ref().unwrap()["details"]["status"], 404);
    }
}
