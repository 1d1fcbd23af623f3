//! Server environment resolution
//!
//! Bridge `env` values of the form `${NAME}` are looked up in a
//! caller-supplied environment; placeholders that cannot be resolved are
//! dropped rather than passed through literally.

use std::collections::HashMap;

use super::types::BridgeConfig;

/// Resolve the environment handed to a spawned MCP server.
pub fn build_environment(
    config: &BridgeConfig,
    context_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut resolved = HashMap::with_capacity(config.env.len());
    for (key, value) in &config.env {
        match placeholder_name(value) {
            Some(name) => {
                if let Some(env_value) = context_env.get(name) {
                    resolved.insert(key.clone(), env_value.clone());
                }
            }
            None => {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }
    resolved
}

/// Snapshot of the current process environment, for callers without one.
pub fn process_environment() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// `Some("NAME")` when `value` is exactly `${NAME}` with NAME in `[A-Z0-9_]+`.
fn placeholder_name(value: &str) -> Option<&str> {
    let name = value.strip_prefix("${")?.strip_suffix('}')?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    valid.then_some(name)
}
