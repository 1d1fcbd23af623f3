//! Prompt templates, tool prompts and versioned agent configs

use std::collections::BTreeMap;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::mcp::ToolDescriptor;

/// Substitution point for the rendered tool list
pub const TOOL_DESCRIPTIONS_PLACEHOLDER: &str = "{{tool_descriptions}}";

/// A prompt template using Handlebars syntax. Output is not HTML-escaped.
pub struct PromptTemplate {
    /// Template name
    name: String,
    /// Handlebars registry
    registry: Handlebars<'static>,
}

impl PromptTemplate {
    /// Create a new prompt template; missing variables render as empty
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self> {
        Self::build(name.into(), template, false)
    }

    /// Like [`PromptTemplate::new`], but rendering fails on missing variables
    pub fn strict(name: impl Into<String>, template: &str) -> Result<Self> {
        Self::build(name.into(), template, true)
    }

    fn build(name: String, template: &str, strict: bool) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(strict);

        registry
            .register_template_string(&name, template)
            .map_err(|e| Error::Template(format!("Invalid template '{}': {}", name, e)))?;

        Ok(PromptTemplate { name, registry })
    }

    /// Render the template with given data
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| Error::Template(format!("Failed to render '{}': {}", self.name, e)))
    }
}

// ============================================================================
// Tool prompts
// ============================================================================

/// Bullet list of tools, optionally with their input schemas.
pub fn format_tool_descriptions(tools: &[ToolDescriptor], include_schemas: bool) -> String {
    let mut lines = Vec::new();
    for tool in tools {
        let description = tool
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("No description provided.");
        lines.push(format!("- {}: {}", tool.name, description));

        if include_schemas && !is_empty_schema(&tool.input_schema) {
            // serde_json maps iterate in key order, so the output is sorted
            let pretty = serde_json::to_string_pretty(&tool.input_schema)
                .unwrap_or_else(|_| tool.input_schema.to_string());
            lines.push("  JSON schema:".to_string());
            lines.extend(pretty.lines().map(|line| format!("    {}", line)));
        }
    }
    lines.join("\n").trim().to_string()
}

/// Render the tool prompt. `None` without tools or without a template.
///
/// A template lacking the `{{tool_descriptions}}` placeholder gets the list
/// appended on a new line.
pub fn build_tool_prompt(
    tools: &[ToolDescriptor],
    template: Option<&str>,
    include_schemas: bool,
) -> Option<String> {
    let template = template.filter(|t| !t.trim().is_empty())?;
    if tools.is_empty() {
        return None;
    }

    let descriptions = format_tool_descriptions(tools, include_schemas);
    if descriptions.is_empty() {
        return None;
    }

    let appended = || format!("{}\n{}", template, descriptions);
    let prompt = if template.contains(TOOL_DESCRIPTIONS_PLACEHOLDER) {
        PromptTemplate::new("tool_prompt", template)
            .and_then(|t| t.render(&json!({ "tool_descriptions": descriptions })))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Tool prompt template failed to render, appending tool list");
                appended()
            })
    } else {
        appended()
    };

    Some(prompt.trim().to_string())
}

fn is_empty_schema(schema: &Value) -> bool {
    match schema {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// ============================================================================
// Agent configs
// ============================================================================

/// A named, versioned prompt configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub prompt_template: String,
    /// Default template variables, values normalized to strings
    pub variables: BTreeMap<String, String>,
    pub enable_tools: bool,
    pub tools: Vec<String>,
    pub tool_prompt_template: Option<String>,
    /// Content hash of template, variables and tool settings
    pub version: String,
    /// `name:version`
    pub key: String,
}

/// Build an [`AgentConfig`], validating variable names and computing its version.
pub fn create_agent_config(
    name: impl Into<String>,
    prompt_template: impl Into<String>,
    variables: &Map<String, Value>,
    enable_tools: bool,
    tools: Vec<String>,
    tool_prompt_template: Option<String>,
) -> Result<AgentConfig> {
    let name = name.into();
    let prompt_template = prompt_template.into();

    let mut normalized = BTreeMap::new();
    for (key, value) in variables {
        if !is_identifier(key) {
            return Err(Error::InvalidInput(format!(
                "Invalid template variable name '{}': use letters, digits and underscores",
                key
            )));
        }
        normalized.insert(key.clone(), value_to_string(value));
    }

    let version = compute_version(&prompt_template, &normalized, &tools, tool_prompt_template.as_deref());
    let key = format!("{}:{}", name, version);

    Ok(AgentConfig {
        name,
        prompt_template,
        variables: normalized,
        enable_tools,
        tools,
        tool_prompt_template,
        version,
        key,
    })
}

/// Render an agent's prompt. Call-time variables override the config's.
///
/// With `include_tools` the tool prompt template is appended on a new line
/// and rendered with the same variables.
pub fn render_prompt(
    config: &AgentConfig,
    extra_vars: &BTreeMap<String, String>,
    include_tools: bool,
) -> Result<String> {
    let mut variables = config.variables.clone();
    variables.extend(extra_vars.iter().map(|(k, v)| (k.clone(), v.clone())));

    let template = if include_tools {
        let tool_template = config.tool_prompt_template.as_deref().ok_or_else(|| {
            Error::Template(format!(
                "Agent '{}' has no tool prompt template to include",
                config.name
            ))
        })?;
        format!("{}\n{}", config.prompt_template, tool_template)
    } else {
        config.prompt_template.clone()
    };

    PromptTemplate::strict(&config.key, &template)?.render(&variables)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compute_version(
    template: &str,
    variables: &BTreeMap<String, String>,
    tools: &[String],
    tool_prompt_template: Option<&str>,
) -> String {
    let payload = json!({
        "template": template,
        "variables": variables,
        "tools": tools,
        "tool_prompt_template": tool_prompt_template,
    });
    let digest = Sha256::digest(payload.to_string().as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}
