//! Session bootstrap against the upstream site.
//!
//! The analysis API only accepts calls carrying the cookies handed out by the
//! explorer page, so every invocation first visits that page with a
//! browser-like request on a fresh cookie-capturing client.

use super::retry::{AttemptError, RetryPolicy};
use crate::config::UpstreamConfig;
use crate::error::{PhalconError, PhalconResult};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, UPGRADE_INSECURE_REQUESTS,
};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info};

/// Call-scoped upstream credentials.
///
/// Wraps a client whose cookie store was populated by [`SessionBootstrapper::bootstrap`].
/// Clones share the same cookie store; nothing outlives the invocation that
/// created the session.
#[derive(Debug, Clone)]
pub struct Session {
    client: reqwest::Client,
}

impl Session {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Establishes a fresh [`Session`] for each invocation.
#[derive(Debug, Clone)]
pub struct SessionBootstrapper {
    upstream: Arc<UpstreamConfig>,
    policy: RetryPolicy,
}

impl SessionBootstrapper {
    pub fn new(upstream: Arc<UpstreamConfig>, policy: RetryPolicy) -> Self {
        Self { upstream, policy }
    }

    /// Build a client with its own cookie jar that never follows redirects.
    fn build_client(&self) -> PhalconResult<reqwest::Client> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .user_agent(self.upstream.user_agent.as_str())
            .timeout(self.upstream.request_timeout())
            .build()?;
        Ok(client)
    }

    fn warmup_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers
    }

    /// Visit the warm-up page until it answers 200, capturing its cookies.
    pub async fn bootstrap(&self) -> PhalconResult<Session> {
        let client = self.build_client()?;
        let url = self.upstream.warmup_url.as_str();

        debug!("Bootstrapping upstream session via {}", url);

        self.policy
            .run("bootstrap", |attempt| {
                debug!("Session warm-up attempt {}", attempt);
                let request = client.get(url).headers(Self::warmup_headers());
                async move {
                    let response = request.send().await.map_err(|e| {
                        AttemptError(format!(
                            "failed to send request to main site: {}",
                            e
                        ))
                    })?;

                    // The body is irrelevant; only the cookies matter.
                    if response.status() != StatusCode::OK {
                        return Err(AttemptError(format!(
                            "main site returned non-200 status code: {}",
                            response.status().as_u16()
                        )));
                    }

                    Ok(())
                }
            })
            .await
            .map_err(|e| PhalconError::Bootstrap {
                attempts: e.attempts,
                cause: e.cause,
            })?;

        info!("Upstream session established");
        Ok(Session { client })
    }
}
