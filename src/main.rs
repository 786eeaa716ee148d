//! Phalcon MCP - BlockSec transaction analysis for AI agents
//!
//! An MCP server that proxies the BlockSec Phalcon explorer: one tool per
//! analysis endpoint, a fan-out transaction overview, and a chain id lookup.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, configuration, or server failure

mod analysis;
mod chains;
mod cli;
mod config;
mod error;
mod models;
mod tools;
mod upstream;

use anyhow::{Context, Result};
use cli::{Args, Command};
use config::Config;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    if args.show_version {
        print_version();
        return Ok(());
    }

    match args.command {
        None => {
            println!("Welcome to Phalcon MCP!");
            Ok(())
        }
        Some(Command::Version) => {
            print_version();
            Ok(())
        }
        Some(Command::Serve) => {
            if let Err(e) = run_server(args).await {
                error!("Server failed: {:#}", e);
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn print_version() {
    println!("Phalcon MCP v{}", env!("CARGO_PKG_VERSION"));
}

/// Handle --init-config: generate a default .phalcon-mcp.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", config::DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize upstream URLs, retries, and timeouts.");
    Ok(())
}

/// Initialize logging. Stdout carries the MCP protocol, so logs go to stderr.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn run_server(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    init_logging(config.logging.tracing_level());
    debug!("Arguments: {:?}", args);
    info!(
        "Upstream {} (retries: {}, request timeout: {}s)",
        config.upstream.api_base, config.retry.max_retries, config.upstream.request_timeout_seconds
    );

    tools::serve_stdio(config).await
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    Ok(Config::load_default()?.unwrap_or_default())
}
