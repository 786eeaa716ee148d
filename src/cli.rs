//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Phalcon MCP - BlockSec transaction analysis over the Model Context Protocol
///
/// Exposes trace, profile, address labels, balance and state changes for
/// on-chain transactions as MCP tools, served over stdio.
///
/// Examples:
///   phalcon-mcp serve
///   phalcon-mcp serve --config ./phalcon.toml --max-retries 5
///   phalcon-mcp version
///   phalcon-mcp --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    pub show_version: bool,

    /// Path to configuration file
    ///
    /// If not specified, uses $PHALCON_CONFIG or .phalcon-mcp.toml in the
    /// current directory
    #[arg(short, long, value_name = "FILE", global = true, env = "PHALCON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Retries after the first attempt for every upstream request
    #[arg(long, value_name = "COUNT", global = true)]
    pub max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Generate a default .phalcon-mcp.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the MCP server on stdio
    Serve,
    /// Print the version number of Phalcon MCP
    Version,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Log level forced by --verbose or --quiet, if either is set.
    pub fn log_level_override(&self) -> Option<tracing::Level> {
        if self.quiet {
            Some(tracing::Level::ERROR)
        } else if self.verbose {
            Some(tracing::Level::DEBUG)
        } else {
            None
        }
    }
}
