//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::{AppConfig, Transport};

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &AppConfig) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_bridge_config(config, result);
    result = validate_agent_config(config, result);
    result = validate_model_config(config, result);

    result
}

fn validate_bridge_config(config: &AppConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let bridge = &config.mcp_bridge;

    match bridge.transport {
        Transport::Stdio => {
            if bridge.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                result = result.with_error(
                    ValidationIssue::new("mcp_bridge.command", "stdio transport requires a command")
                        .with_suggestion("Set mcp_bridge.command or TOOLBRIDGE_MCP_COMMAND"),
                );
            }
        }
        Transport::Http => match &bridge.url {
            Some(raw) => {
                if let Err(e) = url::Url::parse(raw) {
                    result = result.with_error(ValidationIssue::new(
                        "mcp_bridge.url",
                        format!("Invalid URL '{}': {}", raw, e),
                    ));
                }
            }
            None => {
                if bridge.host.is_none() || bridge.port.is_none() {
                    result = result.with_error(
                        ValidationIssue::new(
                            "mcp_bridge.url",
                            "http transport requires a url, or both host and port",
                        )
                        .with_suggestion("Set mcp_bridge.url or TOOLBRIDGE_MCP_URL"),
                    );
                }
            }
        },
    }

    if let Err(e) = bridge.validate() {
        result = result.with_error(ValidationIssue::new("mcp_bridge", e.to_string()));
    }

    if bridge.tool_cache_seconds == 0.0 {
        result = result.with_warning(ValidationIssue::new(
            "mcp_bridge.tool_cache_seconds",
            "Tool catalog caching is disabled; every listing opens a new session",
        ));
    }

    result
}

fn validate_agent_config(config: &AppConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let agent = &config.agent;

    if let Some(template) = &agent.tool_prompt_template {
        if !template.contains("{{tool_descriptions}}") {
            result = result.with_warning(
                ValidationIssue::new(
                    "agent.tool_prompt_template",
                    "Template has no {{tool_descriptions}} placeholder; the tool list will be appended",
                ),
            );
        }
    }

    if !agent.enable_tools && !agent.allowed_tools.is_empty() {
        result = result.with_warning(
            ValidationIssue::new(
                "agent.allowed_tools",
                "allowed_tools is set but enable_tools is false",
            )
            .with_suggestion("Set agent.enable_tools = true"),
        );
    }

    result
}

fn validate_model_config(config: &AppConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let model = &config.model;

    if let Err(e) = url::Url::parse(&model.api_base) {
        result = result.with_error(ValidationIssue::new(
            "model.api_base",
            format!("Invalid URL '{}': {}", model.api_base, e),
        ));
    }

    if !model.timeout_seconds.is_finite() || model.timeout_seconds <= 0.0 {
        result = result.with_error(ValidationIssue::new(
            "model.timeout_seconds",
            format!("must be > 0, got {}", model.timeout_seconds),
        ));
    }

    if model.api_key_env.is_none() {
        result = result.with_warning(
            ValidationIssue::new("model.api_key_env", "No API key variable configured")
                .with_suggestion("Set model.api_key_env, e.g. \"OPENAI_API_KEY\""),
        );
    }

    result
}
