//! Data models for transaction analysis.
//!
//! This module contains the core data structures shared by the upstream
//! pipeline, the aggregator and the tool layer: the analysis subject, the
//! fixed endpoint registry, per-endpoint outcomes and the composite result.

use crate::error::{PhalconError, PhalconResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::fmt;

/// The (chain id, transaction hash) pair being analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    chain_id: u64,
    transaction_hash: String,
}

impl Subject {
    /// Validate raw tool arguments into a subject.
    ///
    /// Runs before any network activity; a failure here means no request is
    /// ever sent for the call.
    pub fn parse(chain_id: &str, transaction_hash: &str) -> PhalconResult<Self> {
        let chain_id = chain_id
            .trim()
            .parse::<u64>()
            .map_err(|e| PhalconError::Validation(format!("invalid chainId format: {}", e)))?;

        // Whitespace-only is empty, but the hash itself is forwarded untouched.
        if transaction_hash.trim().is_empty() {
            return Err(PhalconError::Validation(
                "transactionHash must be a non-empty string".to_string(),
            ));
        }

        Ok(Self {
            chain_id,
            transaction_hash: transaction_hash.to_string(),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn transaction_hash(&self) -> &str {
        &self.transaction_hash
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.transaction_hash)
    }
}

/// Request body expected by the analysis API. Field spellings are fixed upstream.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest<'a> {
    #[serde(rename = "chainID")]
    pub chain_id: u64,
    #[serde(rename = "txnHash")]
    pub txn_hash: &'a str,
    pub blocked: bool,
}

impl<'a> From<&'a Subject> for AnalysisRequest<'a> {
    fn from(subject: &'a Subject) -> Self {
        Self {
            chain_id: subject.chain_id,
            txn_hash: &subject.transaction_hash,
            blocked: false,
        }
    }
}

/// One named upstream analysis capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Trace,
    Profile,
    AddressLabel,
    BalanceChange,
    StateChange,
}

impl Endpoint {
    /// Every endpoint queried by the transaction overview.
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Trace,
        Endpoint::Profile,
        Endpoint::AddressLabel,
        Endpoint::BalanceChange,
        Endpoint::StateChange,
    ];

    /// Upstream path segment, also used as the tool name.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Trace => "trace",
            Endpoint::Profile => "profile",
            Endpoint::AddressLabel => "address-label",
            Endpoint::BalanceChange => "balance-change",
            Endpoint::StateChange => "state-change",
        }
    }

    /// Key under which this endpoint appears in the overview document.
    pub fn result_key(&self) -> &'static str {
        match self {
            Endpoint::Trace => "trace",
            Endpoint::Profile => "profile",
            Endpoint::AddressLabel => "address_label",
            Endpoint::BalanceChange => "balance_change",
            Endpoint::StateChange => "state_change",
        }
    }

    /// Slot in the fixed-size outcome table.
    pub fn index(&self) -> usize {
        match self {
            Endpoint::Trace => 0,
            Endpoint::Profile => 1,
            Endpoint::AddressLabel => 2,
            Endpoint::BalanceChange => 3,
            Endpoint::StateChange => 4,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Result of one endpoint call against one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { payload: Vec<u8> },
    Failure { reason: String },
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Failure reason, if this outcome is not a success.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { reason } => Some(reason),
            Outcome::Cancelled => Some("cancelled"),
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Outcome::Success { payload } => Some(payload),
            _ => None,
        }
    }
}

/// Per-endpoint outcomes of one transaction overview.
///
/// Always holds exactly one outcome for every entry of [`Endpoint::ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeResult {
    outcomes: [Outcome; 5],
}

impl CompositeResult {
    /// Freeze a fully populated table. Slots nobody wrote are recorded as failures.
    pub fn from_table(table: [Option<Outcome>; 5]) -> Self {
        let outcomes = table.map(|slot| {
            slot.unwrap_or_else(|| Outcome::Failure {
                reason: "no outcome recorded".to_string(),
            })
        });
        Self { outcomes }
    }

    pub fn get(&self, endpoint: Endpoint) -> &Outcome {
        &self.outcomes[endpoint.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Endpoint, &Outcome)> {
        Endpoint::ALL.iter().map(move |e| (*e, self.get(*e)))
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Encode as the overview document returned to tool callers.
    ///
    /// Successful payloads are embedded verbatim as JSON; a payload that is
    /// not valid JSON fails the whole encoding.
    pub fn to_json(&self) -> PhalconResult<String> {
        let mut results = BTreeMap::new();

        for (endpoint, outcome) in self.iter() {
            let entry = match outcome {
                Outcome::Success { payload } => OverviewEntry {
                    name: endpoint.result_key(),
                    success: true,
                    data: if payload.is_empty() {
                        None
                    } else {
                        Some(serde_json::from_slice::<Box<RawValue>>(payload)?)
                    },
                    error: None,
                },
                other => OverviewEntry {
                    name: endpoint.result_key(),
                    success: false,
                    data: None,
                    error: other.reason().map(str::to_string),
                },
            };
            results.insert(endpoint.result_key(), entry);
        }

        Ok(serde_json::to_string(&OverviewDocument { results })?)
    }
}

#[derive(Serialize)]
struct OverviewDocument {
    results: BTreeMap<&'static str, OverviewEntry>,
}

#[derive(Serialize)]
struct OverviewEntry {
    name: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// A blockchain entry from the public chain registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chain: String,
    #[serde(rename = "chainSlug", default)]
    pub chain_slug: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_subject_parse_valid() {
        let subject = Subject::parse(" 1 ", "0xabc").unwrap();
        assert_eq!(subject.chain_id(), 1);
        assert_eq!(subject.transaction_hash(), "0xabc");
        assert_eq!(subject.to_string(), "1:0xabc");
    }

    #[test]
    fn test_subject_keeps_hash_verbatim() {
        let subject = Subject::parse("1", " 0xabc\n").unwrap();
        assert_eq!(subject.transaction_hash(), " 0xabc\n");

        let body = serde_json::to_value(AnalysisRequest::from(&subject)).unwrap();
        assert_eq!(body["txnHash"], " 0xabc\n");
    }

    #[test]
    fn test_subject_parse_rejects_bad_input() {
        assert!(Subject::parse("mainnet", "0xabc").unwrap_err().is_validation());
        assert!(Subject::parse("-1", "0xabc").unwrap_err().is_validation());
        assert!(Subject::parse("", "0xabc").unwrap_err().is_validation());
        assert!(Subject::parse("1", "").unwrap_err().is_validation());
        assert!(Subject::parse("1", "   ").unwrap_err().is_validation());
    }

    #[test]
    fn test_analysis_request_field_names() {
        let subject = Subject::parse("56", "0xdead").unwrap();
        let body = serde_json::to_value(AnalysisRequest::from(&subject)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"chainID": 56, "txnHash": "0xdead", "blocked": false})
        );
    }

    #[test]
    fn test_endpoint_registry() {
        let paths: Vec<_> = Endpoint::ALL.iter().map(|e| e.path()).collect();
        assert_eq!(
            paths,
            vec!["trace", "profile", "address-label", "balance-change", "state-change"]
        );
        for (i, e) in Endpoint::ALL.iter().enumerate() {
            assert_eq!(e.index(), i);
        }
        assert_eq!(Endpoint::AddressLabel.result_key(), "address_label");
    }

    #[test]
    fn test_composite_to_json_mixed() {
        let mut table: [Option<Outcome>; 5] = Default::default();
        table[Endpoint::Trace.index()] = Some(Outcome::Success {
            payload: br#"{"calls":[1,2]}"#.to_vec(),
        });
        table[Endpoint::Profile.index()] = Some(Outcome::Failure {
            reason: "boom".to_string(),
        });
        table[Endpoint::StateChange.index()] = Some(Outcome::Cancelled);
        table[Endpoint::BalanceChange.index()] = Some(Outcome::Success { payload: vec![] });

        let composite = CompositeResult::from_table(table);
        let json: Value = serde_json::from_str(&composite.to_json().unwrap()).unwrap();
        let results = json["results"].as_object().unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(results["trace"]["success"], true);
        assert_eq!(results["trace"]["data"]["calls"][1], 2);
        assert_eq!(results["profile"]["error"], "boom");
        assert_eq!(results["state_change"]["error"], "cancelled");
        assert!(results["balance_change"].get("data").is_none());
        assert_eq!(results["address_label"]["error"], "no outcome recorded");
    }

    #[test]
    fn test_composite_to_json_rejects_non_json_payload() {
        let mut table: [Option<Outcome>; 5] = Default::default();
        table[0] = Some(Outcome::Success {
            payload: b"<html>".to_vec(),
        });
        let composite = CompositeResult::from_table(table);
        assert!(matches!(
            composite.to_json(),
            Err(PhalconError::Serialization(_))
        ));
    }

    #[test]
    fn test_chain_data_defaults() {
        let chains: Vec<ChainData> =
            serde_json::from_str(r#"[{"name":"Ethereum Classic","chainId":61}]"#).unwrap();
        assert_eq!(chains[0].chain, "");
        assert_eq!(chains[0].chain_slug, "");
        assert_eq!(chains[0].chain_id, 61);
    }
}
