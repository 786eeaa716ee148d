//! Single-endpoint operations.

use crate::error::PhalconResult;
use crate::models::{Endpoint, Subject};
use crate::upstream::{RequestExecutor, SessionBootstrapper};
use std::sync::Arc;
use tracing::info;

/// Validate, bootstrap a fresh session, call one endpoint.
///
/// Sessions are never reused between calls.
#[derive(Debug, Clone)]
pub struct Facade {
    bootstrapper: SessionBootstrapper,
    executor: Arc<RequestExecutor>,
}

impl Facade {
    pub fn new(bootstrapper: SessionBootstrapper, executor: Arc<RequestExecutor>) -> Self {
        Self {
            bootstrapper,
            executor,
        }
    }

    /// Raw upstream payload for `endpoint`, or the first failure encountered.
    pub async fn run(
        &self,
        endpoint: Endpoint,
        chain_id: &str,
        transaction_hash: &str,
    ) -> PhalconResult<Vec<u8>> {
        let subject = Subject::parse(chain_id, transaction_hash)?;
        info!("{} requested for {}", endpoint, subject);

        let session = self.bootstrapper.bootstrap().await?;
        self.executor.execute(&session, endpoint, &subject).await
    }
}
