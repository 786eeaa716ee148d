//! MCP tool surface.
//!
//! Argument schemas and the mapping from [`PhalconError`] to protocol
//! errors live here; the tool router itself is in [`server`].

pub mod server;

use crate::error::PhalconError;
use rmcp::model::{CallToolResult, Content};
use rmcp::schemars;
use rmcp::ErrorData as McpError;
use serde::Deserialize;

pub use server::serve_stdio;

/// Arguments shared by every transaction tool.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct TransactionArgs {
    #[serde(rename = "chainId")]
    #[schemars(description = "ID of the blockchain")]
    pub chain_id: String,

    #[serde(rename = "transactionHash")]
    #[schemars(description = "Hash of the transaction to analyze")]
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct ChainNameArgs {
    #[schemars(description = "The name of the blockchain to look up")]
    pub name: String,
}

/// Validation problems are the caller's fault; everything else is ours.
pub fn into_tool_error(err: PhalconError) -> McpError {
    if err.is_validation() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        McpError::internal_error(err.to_string(), None)
    }
}

pub(crate) fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}
