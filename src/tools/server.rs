//! The Phalcon MCP server: seven tools over stdio.

use super::{into_tool_error, text_result, ChainNameArgs, TransactionArgs};
use crate::analysis::{Aggregator, Facade};
use crate::chains::ChainRegistry;
use crate::config::Config;
use crate::error::PhalconResult;
use crate::models::Endpoint;
use crate::upstream::{RequestExecutor, RetryPolicy, SessionBootstrapper};
use anyhow::Context;
use rmcp::{
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo},
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const SERVER_NAME: &str = "Phalcon MCP";

#[derive(Clone)]
pub struct PhalconService {
    facade: Arc<Facade>,
    aggregator: Arc<Aggregator>,
    chains: Arc<ChainRegistry>,
    tool_router: ToolRouter<Self>,
}

impl PhalconService {
    /// Wire the upstream pipeline from configuration.
    pub fn from_config(config: &Config) -> PhalconResult<Self> {
        let upstream = Arc::new(config.upstream.clone());
        let policy = RetryPolicy::from(&config.retry);

        let bootstrapper = SessionBootstrapper::new(Arc::clone(&upstream), policy);
        let executor = Arc::new(RequestExecutor::new(Arc::clone(&upstream), policy)?);

        let facade = Facade::new(bootstrapper.clone(), Arc::clone(&executor));
        let aggregator = Aggregator::new(
            bootstrapper,
            executor,
            config.server.aggregate_deadline(),
        );
        let chains = ChainRegistry::new(
            upstream.chain_registry_url.clone(),
            upstream.request_timeout(),
            policy,
        );

        Ok(Self {
            facade: Arc::new(facade),
            aggregator: Arc::new(aggregator),
            chains: Arc::new(chains),
            tool_router: Self::tool_router(),
        })
    }

    async fn single(
        &self,
        endpoint: Endpoint,
        args: TransactionArgs,
    ) -> Result<CallToolResult, McpError> {
        info!("Tool {} called", endpoint);
        let payload = self
            .facade
            .run(endpoint, &args.chain_id, &args.transaction_hash)
            .await
            .map_err(into_tool_error)?;
        Ok(text_result(String::from_utf8_lossy(&payload)))
    }

    /// Overview document for one transaction; `cancel` stops endpoints still in flight.
    async fn overview(
        &self,
        args: TransactionArgs,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        info!("Tool transaction-overview called");
        let document = self
            .aggregator
            .aggregate_json(&args.chain_id, &args.transaction_hash, cancel)
            .await
            .map_err(into_tool_error)?;
        Ok(text_result(document))
    }
}

#[tool_router]
impl PhalconService {
    #[tool(
        description = "Trace the different calls of a transaction on a blockchain also provide gas usage metrics."
    )]
    pub async fn trace(
        &self,
        Parameters(args): Parameters<TransactionArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.single(Endpoint::Trace, args).await
    }

    #[tool(
        description = "Profile a transaction on a blockchain. Gives details about the transaction, flow of funds and token information."
    )]
    pub async fn profile(
        &self,
        Parameters(args): Parameters<TransactionArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.single(Endpoint::Profile, args).await
    }

    #[tool(
        name = "address-label",
        description = "Get human readable labels for contract addresses like tokens, protocols, and other on-chain entities."
    )]
    pub async fn address_label(
        &self,
        Parameters(args): Parameters<TransactionArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.single(Endpoint::AddressLabel, args).await
    }

    #[tool(
        name = "balance-change",
        description = "Retrieve detailed balance change information for a transaction."
    )]
    pub async fn balance_change(
        &self,
        Parameters(args): Parameters<TransactionArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.single(Endpoint::BalanceChange, args).await
    }

    #[tool(
        name = "state-change",
        description = "Retrieve detailed information about state changes like storage variables in contracts for a transaction."
    )]
    pub async fn state_change(
        &self,
        Parameters(args): Parameters<TransactionArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.single(Endpoint::StateChange, args).await
    }

    #[tool(
        name = "transaction-overview",
        description = "Comprehensive overview of a transaction by aggregating data from all available analysis tools."
    )]
    pub async fn transaction_overview(
        &self,
        Parameters(args): Parameters<TransactionArgs>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        // Cancelled when the client sends notifications/cancelled for this request.
        self.overview(args, &context.ct).await
    }

    #[tool(
        name = "get-chain-id-by-name",
        description = "Get the chain ID for a blockchain by name, chain, or chainSlug"
    )]
    pub async fn get_chain_id_by_name(
        &self,
        Parameters(args): Parameters<ChainNameArgs>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool get-chain-id-by-name called for {:?}", args.name);
        let chain_id = self
            .chains
            .lookup(&args.name)
            .await
            .map_err(into_tool_error)?;
        Ok(text_result(chain_id.to_string()))
    }
}

#[tool_handler]
impl ServerHandler for PhalconService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Phalcon MCP analyzes blockchain transactions through BlockSec Phalcon. \
                 Use 'transaction-overview' for everything at once, the individual tools \
                 ('trace', 'profile', 'address-label', 'balance-change', 'state-change') \
                 for one view, and 'get-chain-id-by-name' to resolve a chain id."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }
}

/// Serve the tools over stdin/stdout until the client disconnects.
pub async fn serve_stdio(config: Config) -> anyhow::Result<()> {
    let service = PhalconService::from_config(&config)?;

    info!("Starting {} v{} on stdio", SERVER_NAME, env!("CARGO_PKG_VERSION"));

    let running = service
        .serve(stdio())
        .await
        .context("failed to start stdio MCP server")?;
    let reason = running
        .waiting()
        .await
        .context("stdio MCP server task join failed")?;

    info!("MCP server stopped: {:?}", reason);
    Ok(())
}
