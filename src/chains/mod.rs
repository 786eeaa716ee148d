//! Chain id lookup against the public chainlist.org registry.

use crate::error::{PhalconError, PhalconResult};
use crate::models::ChainData;
use crate::upstream::{AttemptError, RetryPolicy};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

/// Client for the chain registry.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    url: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl ChainRegistry {
    pub fn new(url: impl Into<String>, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            timeout,
            policy,
        }
    }

    /// Download and decode the registry. Decode failures are retried too.
    pub async fn fetch(&self) -> PhalconResult<Vec<ChainData>> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let url = self.url.as_str();

        let chains = self
            .policy
            .run("chain registry", |_| {
                let request = client.get(url);
                async move {
                    let response = request.send().await.map_err(|e| {
                        AttemptError(format!("failed to fetch chain list: {}", e))
                    })?;

                    let status = response.status();
                    let body = response.bytes().await.map_err(|e| {
                        AttemptError(format!("failed to read response body: {}", e))
                    })?;

                    if status != StatusCode::OK {
                        return Err(AttemptError(format!(
                            "chainlist.org returned non-200 status code: {}",
                            status.as_u16()
                        )));
                    }

                    serde_json::from_slice::<Vec<ChainData>>(&body).map_err(|e| {
                        AttemptError(format!("failed to unmarshal chain list: {}", e))
                    })
                }
            })
            .await
            .map_err(|e| {
                PhalconError::ChainLookup(format!(
                    "failed to fetch chain list after {} attempts: {}",
                    e.attempts, e.cause
                ))
            })?;

        debug!("Fetched {} chains from registry", chains.len());
        Ok(chains)
    }

    /// Fetch the registry and resolve `name` to a chain id.
    pub async fn lookup(&self, name: &str) -> PhalconResult<u64> {
        // Reject empty names before touching the network.
        if name.trim().is_empty() {
            return Err(PhalconError::Validation(
                "search term cannot be empty".to_string(),
            ));
        }

        let chains = self.fetch().await?;
        let chain_id = find_chain_by_name(&chains, name)?;
        info!("Resolved chain {:?} to id {}", name, chain_id);
        Ok(chain_id)
    }
}

/// Resolve a search term against `name`, `chain` and `chainSlug`.
///
/// Case-insensitive. An exact match on any of the three fields beats a
/// substring match on `name`; within each tier the first entry wins.
pub fn find_chain_by_name(chains: &[ChainData], search_term: &str) -> PhalconResult<u64> {
    let term = search_term.trim().to_lowercase();
    if term.is_empty() {
        return Err(PhalconError::Validation(
            "search term cannot be empty".to_string(),
        ));
    }

    let mut contains_match: Option<&ChainData> = None;

    for chain in chains {
        let name = chain.name.to_lowercase();
        if name == term
            || chain.chain.to_lowercase() == term
            || chain.chain_slug.to_lowercase() == term
        {
            return Ok(chain.chain_id);
        }
        if contains_match.is_none() && name.contains(&term) {
            contains_match = Some(chain);
        }
    }

    contains_match
        .map(|chain| chain.chain_id)
        .ok_or_else(|| PhalconError::ChainLookup(format!("no chain found matching '{}'", term)))
}
