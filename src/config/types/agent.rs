//! Agent behaviour settings

use serde::{Deserialize, Serialize};

/// Tool prompt used when none is configured
pub const DEFAULT_TOOL_PROMPT_TEMPLATE: &str = "You can call the following MCP tools when helpful. \
Return tool calls with arguments that match the provided JSON schema.\n{{tool_descriptions}}";

/// Configurable defaults for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// System prompt placed before the tool prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub enable_tools: bool,
    /// Handlebars template with a `{{tool_descriptions}}` placeholder
    #[serde(default)]
    pub tool_prompt_template: Option<String>,
    #[serde(default = "default_true")]
    pub include_tool_schemas_in_prompt: bool,
    /// Tool allowlist; empty means every published tool
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

fn default_agent_name() -> String {
    "toolbridge-agent".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            agent_name: default_agent_name(),
            system_prompt: None,
            enable_tools: false,
            tool_prompt_template: None,
            include_tool_schemas_in_prompt: true,
            allowed_tools: Vec::new(),
        }
    }
}

impl AgentSettings {
    /// Settings with tools enabled and the default tool prompt
    pub fn with_tools(agent_name: impl Into<String>) -> Self {
        AgentSettings {
            agent_name: agent_name.into(),
            enable_tools: true,
            tool_prompt_template: Some(DEFAULT_TOOL_PROMPT_TEMPLATE.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_settings_defaults() {
        let settings: AgentSettings =
            serde_json::from_value(serde_json::json!({"agent_name": "example-agent"})).unwrap();
        assert!(settings.tool_prompt_template.is_none());
        assert!(!settings.enable_tools);
        assert!(settings.allowed_tools.is_empty());
        assert!(settings.include_tool_schemas_in_prompt);
    }

    #[test]
    fn test_allowed_tools_are_owned() {
        let mut custom = vec!["alpha".to_string(), "beta".to_string()];
        let settings = AgentSettings {
            allowed_tools: custom.clone(),
            ..AgentSettings::with_tools("example-agent")
        };
        custom.push("gamma".into());
        assert_eq!(settings.allowed_tools, vec!["alpha", "beta"]);
    }
}
