//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.phalcon-mcp.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".phalcon-mcp.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream endpoints and request settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Retry settings shared by every upstream call.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Tool server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream sites the tools proxy to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Site origin, sent as the `Origin` header.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Page visited to obtain session cookies, also sent as `Referer`.
    #[serde(default = "default_warmup_url")]
    pub warmup_url: String,

    /// Base URL of the transaction analysis API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Public chain registry used by the chain id lookup.
    #[serde(default = "default_chain_registry_url")]
    pub chain_registry_url: String,

    /// Browser user agent presented to the upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            warmup_url: default_warmup_url(),
            api_base: default_api_base(),
            chain_registry_url: default_chain_registry_url(),
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Full URL of one analysis endpoint.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }
}

fn default_site_url() -> String {
    "https://app.blocksec.com".to_string()
}

fn default_warmup_url() -> String {
    "https://app.blocksec.com/explorer".to_string()
}

fn default_api_base() -> String {
    "https://app.blocksec.com/api/v1/onchain/tx".to_string()
}

fn default_chain_registry_url() -> String {
    "https://chainlist.org/rpcs.json".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds. Zero disables backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    2000
}

/// Tool server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deadline for a whole transaction overview. Zero disables it.
    #[serde(default = "default_aggregate_timeout")]
    pub aggregate_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            aggregate_timeout_seconds: default_aggregate_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn aggregate_deadline(&self) -> Option<Duration> {
        (self.aggregate_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.aggregate_timeout_seconds))
    }
}

fn default_aggregate_timeout() -> u64 {
    120
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Parsed level, falling back to INFO for unknown values.
    pub fn tracing_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// `$PHALCON_CONFIG` is resolved by the CLI; this only looks in the
    /// working directory. Returns `Ok(None)` if no file exists, `Err` if one
    /// exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let path = Path::new(DEFAULT_CONFIG_FILE);

        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(max_retries) = args.max_retries {
            self.retry.max_retries = max_retries;
        }

        if let Some(timeout) = args.timeout {
            self.upstream.request_timeout_seconds = timeout;
        }

        if let Some(level) = args.log_level_override() {
            self.logging.level = level.to_string().to_lowercase();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
