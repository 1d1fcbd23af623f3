//! Completion endpoint settings

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the OpenAI-compatible completion client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelClientSettings {
    /// Base URL, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_seconds() -> f64 {
    30.0
}

impl Default for ModelClientSettings {
    fn default() -> Self {
        ModelClientSettings {
            api_base: default_api_base(),
            api_key_env: None,
            default_model: default_model(),
            timeout_seconds: default_timeout_seconds(),
            extra_headers: HashMap::new(),
        }
    }
}

impl ModelClientSettings {
    /// Look up the API key in `env` using `api_key_env`
    pub fn resolve_api_key(&self, env: &HashMap<String, String>) -> Option<SecretString> {
        let name = self.api_key_env.as_ref()?;
        env.get(name)
            .filter(|value| !value.is_empty())
            .map(|value| SecretString::from(value.clone()))
    }
}
