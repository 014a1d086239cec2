use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exit code recorded when a submission never produced a process exit status
/// (launch failure or timeout).
pub const NO_EXIT_CODE: i32 = -1;

/// Result of a single transaction submission.
///
/// `raw_output` is kept verbatim: callers pattern-match it for chain error
/// markers and surface it for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub succeeded: bool,
    pub exit_code: i32,
    pub raw_output: String,
    #[serde(default)]
    pub command: Vec<String>,
}

impl TransactionOutcome {
    pub fn new(exit_code: i32, raw_output: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            succeeded: exit_code == 0,
            exit_code,
            raw_output: raw_output.into(),
            command,
        }
    }

    /// Outcome for a submission that never ran to completion.
    pub fn aborted(reason: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            succeeded: false,
            exit_code: NO_EXIT_CODE,
            raw_output: reason.into(),
            command,
        }
    }
}

/// One entry of the service catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServiceEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            description: None,
        }
    }
}

/// `bond-provider` transaction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondTransaction {
    /// Chain-encoded provider public key.
    pub identity: String,
    pub service: String,
    pub amount: String,
    /// Local key that signs the transaction.
    pub from: String,
    pub fees: String,
    pub keyring_backend: String,
}

impl BondTransaction {
    /// Positional arguments following `tx arkeo`.
    pub fn positional_args(&self) -> Vec<String> {
        vec![
            "bond-provider".to_string(),
            self.identity.clone(),
            self.service.clone(),
            self.amount.clone(),
        ]
    }
}

/// `mod-provider` transaction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataTransaction {
    pub identity: String,
    pub service: String,
    pub endpoint_uri: String,
    pub metadata_nonce: String,
    pub status: String,
    pub min_contract_duration: String,
    pub max_contract_duration: String,
    pub subscription_rate: String,
    pub pay_as_you_go_rate: String,
    pub settlement_duration: String,
    /// Explicit account sequence; `None` lets the chain client pick one.
    pub sequence: Option<u64>,
    pub from: String,
    pub fees: String,
    pub keyring_backend: String,
}

impl MetadataTransaction {
    pub fn positional_args(&self) -> Vec<String> {
        vec![
            "mod-provider".to_string(),
            self.identity.clone(),
            self.service.clone(),
            self.endpoint_uri.clone(),
            self.metadata_nonce.clone(),
            self.status.clone(),
            self.min_contract_duration.clone(),
            self.max_contract_duration.clone(),
            self.subscription_rate.clone(),
            self.pay_as_you_go_rate.clone(),
            self.settlement_duration.clone(),
        ]
    }

    /// Same transaction with a different sequence.
    pub fn with_sequence(&self, sequence: Option<u64>) -> Self {
        Self {
            sequence,
            ..self.clone()
        }
    }
}

/// `--sequence` flag pair, empty when no sequence is known.
pub fn sequence_args(sequence: Option<u64>) -> Vec<String> {
    match sequence {
        Some(value) => vec!["--sequence".to_string(), value.to_string()],
        None => Vec::new(),
    }
}

/// Flattened view of one service offered by a bonded provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderServiceView {
    pub name: Option<String>,
    pub id: Option<String>,
    pub service: Option<String>,
    pub metadata_uri: Option<String>,
    pub metadata_nonce: Option<String>,
    pub status: Option<String>,
    pub min_contract_dur: Option<String>,
    pub max_contract_dur: Option<String>,
    pub subscription_rates: String,
    pub pay_as_you_go_rates: String,
    pub settlement_dur: Option<String>,
}

/// Output of `arkeod status` with the latest block height pulled out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub height: Option<String>,
    pub status: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_tx() -> MetadataTransaction {
        MetadataTransaction {
            identity: "arkeopub1abc".into(),
            service: "btc-mainnet-fullnode".into(),
            endpoint_uri: "http://127.0.0.1:3636/metadata.json".into(),
            metadata_nonce: "1".into(),
            status: "1".into(),
            min_contract_duration: "5".into(),
            max_contract_duration: "432000".into(),
            subscription_rate: "200uarkeo".into(),
            pay_as_you_go_rate: "200uarkeo".into(),
            settlement_duration: "1000".into(),
            sequence: None,
            from: "provider".into(),
            fees: "200uarkeo".into(),
            keyring_backend: "test".into(),
        }
    }

    #[test]
    fn outcome_success_follows_exit_code() {
        assert!(TransactionOutcome::new(0, "ok", vec![]).succeeded);
        assert!(!TransactionOutcome::new(1, "boom", vec![]).succeeded);

        let aborted = TransactionOutcome::aborted("timed out", vec!["arkeod".into()]);
        assert!(!aborted.succeeded);
        assert_eq!(aborted.exit_code, NO_EXIT_CODE);
    }

    #[test]
    fn metadata_positional_order_matches_cli() {
        let args = metadata_tx().positional_args();
        assert_eq!(args[0], "mod-provider");
        assert_eq!(args[1], "arkeopub1abc");
        assert_eq!(args[3], "http://127.0.0.1:3636/metadata.json");
        assert_eq!(args.last().map(String::as_str), Some("1000"));
        assert_eq!(args.len(), 11);
    }

    #[test]
    fn with_sequence_only_touches_sequence() {
        let tx = metadata_tx();
        let retried = tx.with_sequence(Some(6));
        assert_eq!(retried.sequence, Some(6));
        assert_eq!(retried.positional_args(), tx.positional_args());
        assert_eq!(sequence_args(retried.sequence), vec!["--sequence", "6"]);
        assert!(sequence_args(None).is_empty());
    }
}
