use crate::retry::RetryPolicy;
use crate::types::AccountSequence;
use once_cell::sync::Lazy;
use provider_chain::{with_timeout, ChainClient};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Substring the chain prints when a transaction used a stale sequence.
pub const SEQUENCE_MISMATCH_MARKER: &str = "account sequence mismatch";

static EXPECTED_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"expected\s+(\d+)").expect("valid sequence regex"));

pub fn is_sequence_mismatch(output: &str) -> bool {
    output.contains(SEQUENCE_MISMATCH_MARKER)
}

/// Sequence the chain asked for in a mismatch error, if it named one.
pub fn expected_sequence(output: &str) -> Option<u64> {
    EXPECTED_SEQUENCE
        .captures(output)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Reads account sequences with bounded retry. Exhaustion yields `None`.
#[derive(Clone)]
pub struct SequenceTracker {
    client: Arc<dyn ChainClient>,
    call_timeout: Duration,
    policy: RetryPolicy,
}

impl SequenceTracker {
    pub fn new(client: Arc<dyn ChainClient>, call_timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            client,
            call_timeout,
            policy,
        }
    }

    pub async fn fetch(&self, identity: &str) -> Option<AccountSequence> {
        self.fetch_with(identity, &self.policy).await
    }

    pub async fn fetch_with(&self, identity: &str, policy: &RetryPolicy) -> Option<AccountSequence> {
        let found = policy
            .run(|attempt| async move {
                let lookup = with_timeout(
                    self.call_timeout,
                    "account sequence",
                    self.client.account_sequence(identity),
                )
                .await;
                match lookup {
                    Ok(Some(value)) => Some(AccountSequence { value, attempt }),
                    Ok(None) => {
                        debug!("account {} reported no sequence (attempt {})", identity, attempt);
                        None
                    }
                    Err(err) => {
                        debug!("sequence lookup attempt {} failed: {}", attempt, err);
                        None
                    }
                }
            })
            .await;

        if found.is_none() {
            warn!(
                "no account sequence for {} after {} attempts",
                identity, policy.max_attempts
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_chain::{ChainError, ScriptedChainClient};

    #[test]
    fn mismatch_marker_detection() {
        assert!(is_sequence_mismatch(
            "raw_log: 'account sequence mismatch, expected 6, got 5: incorrect account sequence'"
        ));
        assert!(!is_sequence_mismatch("insufficient fees"));
    }

    #[test]
    fn expected_sequence_extraction() {
        assert_eq!(
            expected_sequence("account sequence mismatch, expected 6, got 5"),
            Some(6)
        );
        assert_eq!(expected_sequence("expected\t\t42"), Some(42));
        assert_eq!(expected_sequence("account sequence mismatch"), None);
        assert_eq!(expected_sequence("expected six"), None);
    }

    #[tokio::test]
    async fn retries_until_a_sequence_appears() {
        let stub = ScriptedChainClient::new();
        stub.push_sequence(Err(ChainError::Backend("rpc down".into())));
        stub.push_sequence(Ok(None));
        stub.push_sequence(Ok(Some(5)));
        let tracker =
            SequenceTracker::new(Arc::new(stub.clone()), Duration::from_secs(1), RetryPolicy::immediate(3));

        let sequence = tracker.fetch("addr1").await.unwrap();
        assert_eq!(sequence, AccountSequence { value: 5, attempt: 3 });
        assert_eq!(stub.sequence_lookups(), 3);
    }

    #[tokio::test]
    async fn exhaustion_yields_none() {
        let stub = ScriptedChainClient::new();
        let tracker =
            SequenceTracker::new(Arc::new(stub.clone()), Duration::from_secs(1), RetryPolicy::immediate(3));
        assert!(tracker.fetch("addr1").await.is_none());
        assert_eq!(stub.sequence_lookups(), 3);
    }
}
