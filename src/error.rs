//! Error taxonomy for the analysis core.
//!
//! Validation and bootstrap failures abort a call before any endpoint is
//! attempted. Request failures are contained per endpoint by the aggregator
//! and propagated directly by the single-operation facade.

use crate::models::Endpoint;
use thiserror::Error;

/// Errors produced by the upstream pipeline and the operations built on it.
#[derive(Debug, Error)]
pub enum PhalconError {
    /// Malformed subject or tool arguments. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The upstream session could not be established.
    #[error("failed to fetch cookies after {attempts} attempts: {cause}")]
    Bootstrap { attempts: u32, cause: String },

    /// One endpoint call exhausted its retry budget.
    #[error("{endpoint} request failed after {attempts} attempts: {cause}")]
    Request {
        endpoint: Endpoint,
        attempts: u32,
        cause: String,
    },

    /// The composite result could not be encoded.
    #[error("failed to marshal overview results: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Chain registry fetch or name matching failed.
    #[error("{0}")]
    ChainLookup(String),

    /// A configured value cannot be used to build requests.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The call was cancelled before any endpoint was attempted.
    #[error("operation cancelled")]
    Cancelled,
}

impl PhalconError {
    /// Whether this error was caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, PhalconError::Validation(_))
    }
}

pub type PhalconResult<T> = Result<T, PhalconError>;
