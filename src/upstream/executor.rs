//! Resilient calls to the transaction analysis API.

use super::retry::{AttemptError, RetryPolicy};
use super::session::Session;
use crate::config::UpstreamConfig;
use crate::error::{PhalconError, PhalconResult};
use crate::models::{AnalysisRequest, Endpoint, Subject};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info};

/// Longest slice of an error response body kept in a failure cause.
const MAX_ERROR_BODY: usize = 1024;

/// Performs one endpoint call for one subject under the retry policy.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    upstream: Arc<UpstreamConfig>,
    policy: RetryPolicy,
    headers: HeaderMap,
}

impl RequestExecutor {
    /// Fails if the configured site or warm-up URL is not a valid header value.
    pub fn new(upstream: Arc<UpstreamConfig>, policy: RetryPolicy) -> PhalconResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ORIGIN, header_value(&upstream.site_url)?);
        headers.insert(REFERER, header_value(&upstream.warmup_url)?);

        Ok(Self {
            upstream,
            policy,
            headers,
        })
    }

    /// Call `endpoint` for `subject` and return the raw response body.
    ///
    /// The same serialized body is re-sent on every attempt. Only a 200 with a
    /// fully read body counts as success; the payload is passed through as-is.
    pub async fn execute(
        &self,
        session: &Session,
        endpoint: Endpoint,
        subject: &Subject,
    ) -> PhalconResult<Vec<u8>> {
        let body = serde_json::to_vec(&AnalysisRequest::from(subject))?;
        let url = self.upstream.endpoint_url(endpoint.path());
        let client = session.client();

        let payload = self
            .policy
            .run(endpoint.path(), |attempt| {
                debug!("POST {} for {} (attempt {})", url, subject, attempt);
                let request = client
                    .post(&url)
                    .headers(self.headers.clone())
                    .body(body.clone());
                async move {
                    let response = request.send().await.map_err(|e| {
                        AttemptError(format!(
                            "failed to send request to BlockSec API: {}",
                            e
                        ))
                    })?;

                    let status = response.status();
                    let bytes = response.bytes().await.map_err(|e| {
                        AttemptError(format!("failed to read response: {}", e))
                    })?;

                    if status == StatusCode::OK {
                        Ok(bytes.to_vec())
                    } else {
                        Err(AttemptError(format!(
                            "BlockSec API returned non-200 status code: {} - {}",
                            status.as_u16(),
                            truncate_body(&bytes)
                        )))
                    }
                }
            })
            .await
            .map_err(|e| PhalconError::Request {
                endpoint,
                attempts: e.attempts,
                cause: e.cause,
            })?;

        info!("{} for {} returned {} bytes", endpoint, subject, payload.len());
        Ok(payload)
    }
}

fn header_value(value: &str) -> PhalconResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| PhalconError::Config(format!("invalid header value {:?}: {}", value, e)))
}

/// Lossy text of an error body, cut to [`MAX_ERROR_BODY`] bytes on a char boundary.
fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY {
        return text.into_owned();
    }

    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
