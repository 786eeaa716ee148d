//! Transaction overview: every endpoint for one subject, fanned out.
//!
//! One session is bootstrapped and shared by a worker per endpoint. Workers
//! report `(Endpoint, Outcome)` pairs to a single collector task that owns the
//! fixed-size outcome table; no worker's failure affects its peers.
//!
//! # Stages
//! ```text
//! Validating → Bootstrapping → Running → Done
//!     │              │
//!     └─ Validation  └─ Bootstrap / Cancelled   (fail fast, no partial result)
//! ```

use crate::error::{PhalconError, PhalconResult};
use crate::models::{CompositeResult, Endpoint, Outcome, Subject};
use crate::upstream::{RequestExecutor, SessionBootstrapper};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress of one aggregate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStage {
    Validating,
    Bootstrapping,
    Running,
    Done,
}

impl fmt::Display for AggregateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateStage::Validating => write!(f, "validating"),
            AggregateStage::Bootstrapping => write!(f, "bootstrapping"),
            AggregateStage::Running => write!(f, "running"),
            AggregateStage::Done => write!(f, "done"),
        }
    }
}

/// Cancels a token once a deadline passes; the timer dies with the guard.
struct DeadlineGuard(JoinHandle<()>);

impl DeadlineGuard {
    fn arm(deadline: Duration, token: CancellationToken) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!("Transaction overview deadline of {:?} reached", deadline);
            token.cancel();
        }))
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Fan-out aggregator over the fixed endpoint set.
#[derive(Debug, Clone)]
pub struct Aggregator {
    bootstrapper: SessionBootstrapper,
    executor: Arc<RequestExecutor>,
    deadline: Option<Duration>,
}

impl Aggregator {
    pub fn new(
        bootstrapper: SessionBootstrapper,
        executor: Arc<RequestExecutor>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            bootstrapper,
            executor,
            deadline,
        }
    }

    /// Query every endpoint for one transaction and assemble the outcomes.
    ///
    /// Fails only on invalid input, bootstrap failure, or cancellation before
    /// the endpoints start. Endpoint failures and cancellations after that are
    /// recorded per key and the call still succeeds.
    pub async fn aggregate(
        &self,
        chain_id: &str,
        transaction_hash: &str,
        cancel: &CancellationToken,
    ) -> PhalconResult<CompositeResult> {
        enter(AggregateStage::Validating);
        let subject = Arc::new(Subject::parse(chain_id, transaction_hash)?);

        let cancel = cancel.child_token();
        let _deadline = self
            .deadline
            .map(|deadline| DeadlineGuard::arm(deadline, cancel.clone()));

        enter(AggregateStage::Bootstrapping);
        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PhalconError::Cancelled),
            session = self.bootstrapper.bootstrap() => session?,
        };

        enter(AggregateStage::Running);
        let (tx, rx) = mpsc::channel::<(Endpoint, Outcome)>(Endpoint::ALL.len());
        let collector = tokio::spawn(collect(rx));

        let workers: Vec<JoinHandle<()>> = Endpoint::ALL
            .iter()
            .map(|&endpoint| {
                let executor = Arc::clone(&self.executor);
                let session = session.clone();
                let subject = Arc::clone(&subject);
                let cancel = cancel.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => Outcome::Cancelled,
                        result = executor.execute(&session, endpoint, &subject) => match result {
                            Ok(payload) => Outcome::Success { payload },
                            Err(e) => {
                                warn!("{} failed for {}: {}", endpoint, subject, e);
                                Outcome::Failure { reason: e.to_string() }
                            }
                        },
                    };
                    // The collector outlives every worker.
                    let _ = tx.send((endpoint, outcome)).await;
                })
            })
            .collect();

        for (endpoint, joined) in Endpoint::ALL.iter().zip(join_all(workers).await) {
            if let Err(e) = joined {
                warn!("{} worker did not finish: {}", endpoint, e);
                let _ = tx
                    .send((
                        *endpoint,
                        Outcome::Failure {
                            reason: format!("worker panicked: {}", e),
                        },
                    ))
                    .await;
            }
        }
        drop(tx);

        let table = collector.await.unwrap_or_default();
        let composite = CompositeResult::from_table(table);

        enter(AggregateStage::Done);
        info!(
            "Transaction overview for {}: {}/{} endpoints succeeded",
            subject,
            composite.success_count(),
            Endpoint::ALL.len()
        );

        Ok(composite)
    }

    /// [`aggregate`](Self::aggregate), encoded as the overview document.
    pub async fn aggregate_json(
        &self,
        chain_id: &str,
        transaction_hash: &str,
        cancel: &CancellationToken,
    ) -> PhalconResult<String> {
        self.aggregate(chain_id, transaction_hash, cancel)
            .await?
            .to_json()
    }
}

fn enter(stage: AggregateStage) {
    debug!("Transaction overview stage: {}", stage);
}

/// Sole owner of the outcome table while workers run.
async fn collect(mut rx: mpsc::Receiver<(Endpoint, Outcome)>) -> [Option<Outcome>; 5] {
    let mut table: [Option<Outcome>; 5] = Default::default();
    while let Some((endpoint, outcome)) = rx.recv().await {
        table[endpoint.index()] = Some(outcome);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::test_support::{fast_policy, mount_warmup, upstream_for};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn aggregator_for(server: &MockServer, deadline: Option<Duration>) -> Aggregator {
        let upstream = upstream_for(server);
        Aggregator::new(
            SessionBootstrapper::new(Arc::clone(&upstream), fast_policy()),
            Arc::new(RequestExecutor::new(upstream, fast_policy()).unwrap()),
            deadline,
        )
    }

    fn api_path(endpoint: Endpoint) -> String {
        format!("/api/v1/onchain/tx/{}", endpoint.path())
    }

    /// Answers with the endpoint path and the hash it was asked about.
    struct EchoSubject;

    impl Respond for EchoSubject {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            ResponseTemplate::new(200).set_body_json(json!({
                "path": request.url.path(),
                "txnHash": body["txnHash"],
            }))
        }
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_all_keys() {
        let server = MockServer::start().await;
        mount_warmup(&server).await;

        for endpoint in [Endpoint::Trace, Endpoint::Profile, Endpoint::AddressLabel] {
            Mock::given(method("POST"))
                .and(path(api_path(endpoint)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(format!(r#"{{"endpoint":"{}"}}"#, endpoint)),
                )
                .mount(&server)
                .await;
        }
        for endpoint in [Endpoint::BalanceChange, Endpoint::StateChange] {
            Mock::given(method("POST"))
                .and(path(api_path(endpoint)))
                .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
                .expect(4)
                .mount(&server)
                .await;
        }

        let composite = aggregator_for(&server, None)
            .aggregate("1", "0xabc", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(composite.iter().count(), 5);
        assert_eq!(composite.success_count(), 3);
        assert_eq!(
            composite.get(Endpoint::Profile).payload(),
            Some(br#"{"endpoint":"profile"}"#.as_slice())
        );
        for endpoint in [Endpoint::BalanceChange, Endpoint::StateChange] {
            let reason = composite.get(endpoint).reason().unwrap();
            assert!(reason.contains("500"));
            assert!(reason.contains("upstream down"));
        }

        let json: Value = serde_json::from_str(&composite.to_json().unwrap()).unwrap();
        assert_eq!(json["results"]["address_label"]["data"]["endpoint"], "address-label");
        assert_eq!(json["results"]["state_change"]["success"], false);
    }

    #[tokio::test]
    async fn test_validation_fails_without_network() {
        let server = MockServer::start().await;
        let aggregator = aggregator_for(&server, None);
        let cancel = CancellationToken::new();

        let err = aggregator.aggregate("abc", "0xabc", &cancel).await.unwrap_err();
        assert!(err.is_validation());
        let err = aggregator.aggregate("1", "", &cancel).await.unwrap_err();
        assert!(err.is_validation());

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_skips_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/explorer"))
            .respond_with(ResponseTemplate::new(403))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = aggregator_for(&server, None)
            .aggregate("1", "0xabc", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(PhalconError::Bootstrap { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_aggregates_do_not_mix_subjects() {
        let server = MockServer::start().await;
        mount_warmup(&server).await;
        Mock::given(method("POST"))
            .respond_with(EchoSubject)
            .mount(&server)
            .await;

        let aggregator = aggregator_for(&server, None);
        let cancel = CancellationToken::new();
        let hashes: Vec<String> = (0..6).map(|i| format!("0x{:064x}", i)).collect();

        let results = join_all(
            hashes
                .iter()
                .map(|hash| aggregator.aggregate("1", hash, &cancel)),
        )
        .await;

        for (hash, result) in hashes.iter().zip(results) {
            let composite = result.unwrap();
            for (endpoint, outcome) in composite.iter() {
                let payload: Value = serde_json::from_slice(outcome.payload().unwrap()).unwrap();
                assert_eq!(payload["txnHash"], hash.as_str());
                assert_eq!(payload["path"], api_path(endpoint));
            }
        }
    }

    #[tokio::test]
    async fn test_cancellation_records_cancelled_outcomes() {
        let server = MockServer::start().await;
        mount_warmup(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let aggregator = aggregator_for(&server, None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let composite = aggregator.aggregate("1", "0xabc", &cancel).await.unwrap();
        for (_, outcome) in composite.iter() {
            assert_eq!(outcome, &Outcome::Cancelled);
        }
    }

    #[tokio::test]
    async fn test_deadline_cancels_slow_endpoints() {
        let server = MockServer::start().await;
        mount_warmup(&server).await;
        Mock::given(method("POST"))
            .and(path(api_path(Endpoint::Trace)))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let composite = aggregator_for(&server, Some(Duration::from_millis(500)))
            .aggregate("1", "0xabc", &CancellationToken::new())
            .await
            .unwrap();

        assert!(composite.get(Endpoint::Trace).is_success());
        assert_eq!(composite.get(Endpoint::StateChange), &Outcome::Cancelled);
        assert_eq!(composite.success_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let server = MockServer::start().await;
        mount_warmup(&server).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = aggregator_for(&server, None)
            .aggregate("1", "0xabc", &cancel)
            .await;
        assert!(matches!(result, Err(PhalconError::Cancelled)));
    }

    #[tokio::test]
    async fn test_aggregate_json_rejects_non_json_payload() {
        let server = MockServer::start().await;
        mount_warmup(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = aggregator_for(&server, None)
            .aggregate_json("1", "0xabc", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PhalconError::Serialization(_))));
    }
}
