//! mcp-relay: Multi-server MCP relay main binary
//!
//! Connects to every tool server script given on the command line and
//! starts an interactive chat that can call their tools.
//!
//! Usage:
//!   mcp-relay <server_script>...   - Connect to the servers and start chatting
//!   mcp-relay --help               - Show help
//!   mcp-relay --version            - Show version

mod cli;
mod error;

use relay_agent::Conversation;
use relay_core::{ClaudeClient, Config};
use relay_mcp::{ChildProcessConnector, ServerRegistry, ToolCatalog};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::StartupError;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Connect to the given server scripts and chat
    Relay(Vec<String>),
    /// No server scripts given
    Usage,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let scripts = match parse_args(&args) {
        RunMode::Usage => {
            print_usage();
            return Ok(());
        }
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("mcp-relay {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Relay(scripts) => scripts,
    };

    // Logs go to stderr so answers on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let config = load_config()?;
    let client = ClaudeClient::new(&config.llm).map_err(StartupError::Client)?;

    info!("Starting mcp-relay...");
    info!(model = %config.llm.model, servers = scripts.len(), "Configuration loaded");

    let mut registry = ServerRegistry::new(ChildProcessConnector, config.launch.clone());

    if let Err(e) = run(&mut registry, client, &config, &scripts).await {
        error!(error = %e, "Unhandled error");
    }

    let report = registry.disconnect_all().await;
    if !report.is_clean() {
        warn!(failed = report.failures.len(), "Some server connections did not close cleanly");
    }

    Ok(())
}

/// Parse command line arguments (program name excluded)
fn parse_args(args: &[String]) -> RunMode {
    if args.is_empty() {
        return RunMode::Usage;
    }

    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-V" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Relay(args.to_vec())
}

/// Load configuration and check that an API key is present
fn load_config() -> Result<Config, StartupError> {
    let config = Config::load().map_err(StartupError::Config)?;
    config
        .validate()
        .map_err(|_| StartupError::MissingCredential)?;
    Ok(config)
}

/// Connect, then chat until the operator leaves
async fn run(
    registry: &mut ServerRegistry,
    client: ClaudeClient,
    config: &Config,
    scripts: &[String],
) -> anyhow::Result<()> {
    let failures = registry.connect_scripts(scripts).await;
    for failure in &failures {
        eprintln!("Failed to connect: {}", failure);
    }

    if registry.is_empty() {
        println!("No servers connected. Exiting.");
        return Ok(());
    }

    let catalog = ToolCatalog::rebuild(registry);
    if catalog.is_empty() {
        println!("Connected servers expose no tools. Exiting.");
        return Ok(());
    }

    println!(
        "Connected to {} server(s) with tools: {}",
        registry.len(),
        catalog.names().join(", ")
    );

    let conversation = Conversation::from_config(client, config);
    cli::chat_loop(registry, &catalog, conversation).await
}

/// Print usage when no server script is given
fn print_usage() {
    println!("Usage: mcp-relay <path_to_server_script_1> [path_to_server_script_2] ...");
    println!("Example: mcp-relay ../weather-server/dist/index.js ../prompts-server/main.py");
}

/// Print help message
fn print_help() {
    println!("mcp-relay - Chat with an LLM that can use tools from several MCP servers");
    println!();
    print_usage();
    println!();
    println!("Options:");
    println!("  -h, --help       Show this help message");
    println!("  -V, --version    Show version");
    println!();
    println!("Server scripts:");
    println!("  *.js             Run with Node.js (override: MCP_RELAY_NODE)");
    println!("  *.py             Run with Python (override: MCP_RELAY_PYTHON)");
    println!();
    println!("Environment Variables:");
    println!("  ANTHROPIC_API_KEY          API key (required, LLM_API_KEY also accepted)");
    println!("  LLM_MODEL                  Model name (default: claude-3-haiku-20240307)");
    println!("  LLM_BASE_URL               Custom API endpoint");
    println!("  LLM_MAX_TOKENS             Max tokens per reply (default: 1000)");
    println!("  MCP_RELAY_MAX_TOOL_ROUNDS  Tool rounds per query (default: 1)");
    println!("  RUST_LOG                   Log filter (default: info)");
    println!();
    println!("Settings can also be placed in ./{}", relay_core::config::CONFIG_FILE_NAME);
}
