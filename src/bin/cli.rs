//! Toolbridge CLI
//!
//! Inspect an MCP server's tools, call one directly, or run the agent loop
//! against an OpenAI-compatible endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolbridge::agent::{
    build_conversation, resolve_tool_prompt, AgentLoop, AgentLoopConfig, AgentLoopPayload,
    CompletionConfig, OpenAiCompatClient,
};
use toolbridge::config::{
    apply_env_overrides, load_config, load_config_from_path, process_environment, validate_config,
    AppConfig, LogConfig,
};
use toolbridge::mcp::{BridgeClient, ToolBridge, ToolInvocation};
use toolbridge::VERSION;

#[derive(Parser)]
#[command(
    name = "toolbridge",
    version = VERSION,
    about = "Bridge MCP server tools into a language-model agent",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the per-user config path)
    #[arg(long, global = true, env = "TOOLBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tools the MCP server publishes
    ListTools,

    /// Call a single tool and print the normalized result
    CallTool {
        /// Tool name
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Ask the agent a question, letting it use the server's tools
    Ask {
        /// User message
        message: String,
        /// Completion turns before giving up
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = load_config_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?;
            apply_env_overrides(&mut config);
            config
        }
        None => load_config()?,
    };

    init_logging(&config.log)?;

    match cli.command {
        Commands::ListTools => list_tools(&config).await,
        Commands::CallTool { name, args } => call_tool(&config, &name, &args).await,
        Commands::Ask {
            message,
            max_iterations,
        } => ask(&config, &message, max_iterations).await,
        Commands::CheckConfig => check_config(&config),
    }
}

fn init_logging(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&log.level)
        .with_context(|| format!("invalid log filter '{}'", log.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn bridge_for(config: &AppConfig) -> anyhow::Result<BridgeClient> {
    let bridge = BridgeClient::with_environment(config.mcp_bridge.clone(), process_environment())?;
    Ok(bridge)
}

/// Print the tool catalog
async fn list_tools(config: &AppConfig) -> anyhow::Result<()> {
    let bridge = bridge_for(config)?;
    let tools = bridge.list_tools().await?;

    if tools.is_empty() {
        println!("No tools published.");
        return Ok(());
    }

    println!("{} tool(s):\n", tools.len());
    for tool in &tools {
        match &tool.description {
            Some(description) => println!("  {:<24} {}", tool.name, description),
            None => println!("  {}", tool.name),
        }
    }
    Ok(())
}

/// Call one tool with JSON arguments
async fn call_tool(config: &AppConfig, name: &str, args: &str) -> anyhow::Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).context("--args must be valid JSON")?;
    let Some(arguments) = arguments.as_object().cloned() else {
        bail!("--args must be a JSON object");
    };

    let bridge = bridge_for(config)?;
    let result = bridge.call_tool(ToolInvocation::new(name, arguments)).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Run the agent loop and print the answer plus tool-call log
async fn ask(config: &AppConfig, message: &str, max_iterations: Option<u32>) -> anyhow::Result<()> {
    let env = process_environment();
    let bridge: Arc<dyn ToolBridge> =
        Arc::new(BridgeClient::with_environment(config.mcp_bridge.clone(), env.clone())?);
    let client = Arc::new(OpenAiCompatClient::from_settings(&config.model, &env)?);

    let (tool_prompt, tools) = resolve_tool_prompt(bridge.as_ref(), &config.agent).await;
    info!(tools = tools.len(), "Resolved agent tools");

    let conversation = build_conversation(
        None,
        message,
        config.agent.system_prompt.as_deref(),
        tool_prompt.as_deref(),
    );

    let loop_config = match max_iterations {
        Some(n) => AgentLoopConfig::with_max_iterations(n),
        None => AgentLoopConfig::default(),
    };

    let payload = AgentLoopPayload {
        conversation,
        completion_config: CompletionConfig::default().with_tools(tools),
        loop_config,
        agent_settings: config.agent.clone(),
    };

    let result = AgentLoop::new(client, bridge).run(payload).await?;

    match result.final_answer() {
        Some(answer) => println!("{}", answer),
        None => println!(
            "No final answer after {} iteration(s).",
            result.iterations
        ),
    }

    if !result.tool_call_log.is_empty() {
        println!("\nTool calls:");
        println!("{}", serde_json::to_string_pretty(&result.tool_call_log)?);
    }
    Ok(())
}

/// Report configuration errors and warnings
fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    let result = validate_config(config);

    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for error in &result.errors {
        println!("error: {}", error);
    }

    if !result.valid {
        bail!("configuration has {} error(s)", result.errors.len());
    }
    println!("Configuration OK");
    Ok(())
}
