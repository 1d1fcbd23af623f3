//! Configuration module
//!
//! - types/: bridge, agent, model and logging settings
//! - env.rs: server environment placeholder resolution
//! - io.rs: configuration loading and saving
//! - validation.rs: configuration validation
//! - paths.rs: configuration file paths

mod env;
mod io;
mod paths;
mod types;
mod validation;

pub use types::{AppConfig, LogConfig};
pub use types::agent::{AgentSettings, DEFAULT_TOOL_PROMPT_TEMPLATE};
pub use types::bridge::{BridgeConfig, Transport};
pub use types::model::ModelClientSettings;

pub use env::{build_environment, process_environment};
pub use io::{
    apply_env_overrides, apply_overrides_from, load_config, load_config_from_path, parse_config,
    read_config_snapshot, save_config, ConfigSnapshot,
};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
