//! Resilient request pipeline to the upstream analysis site.
//!
//! Session bootstrap and endpoint calls share one explicit [`RetryPolicy`].

pub mod executor;
pub mod retry;
pub mod session;

pub use executor::RequestExecutor;
pub use retry::{AttemptError, RetryPolicy};
pub use session::SessionBootstrapper;

#[cfg(test)]
pub(crate) mod test_support {
    use super::RetryPolicy;
    use crate::config::UpstreamConfig;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Upstream settings pointing every URL at a mock server.
    pub fn upstream_for(server: &MockServer) -> Arc<UpstreamConfig> {
        let base = server.uri();
        Arc::new(UpstreamConfig {
            site_url: base.clone(),
            warmup_url: format!("{}/explorer", base),
            api_base: format!("{}/api/v1/onchain/tx", base),
            chain_registry_url: format!("{}/rpcs.json", base),
            request_timeout_seconds: 10,
            ..UpstreamConfig::default()
        })
    }

    /// Default attempt budget without backoff delays.
    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy::immediate(3)
    }

    /// Warm-up page that hands out a session cookie.
    pub async fn mount_warmup(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/explorer"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "session=warm; Path=/"),
            )
            .mount(server)
            .await;
    }
}
