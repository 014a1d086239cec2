//! In-memory [`ChainClient`] with scripted replies, for tests and dry runs.

use crate::client::ChainClient;
use crate::errors::{ChainError, Result};
use crate::types::{
    sequence_args, BondTransaction, MetadataTransaction, NodeStatus, ServiceEntry,
    TransactionOutcome,
};
use crate::normalize;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Every call the stub received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    PublicKey { key_name: String },
    EncodePublicKey { raw_key: String },
    FindProvider { identity: String, service: String },
    AccountSequence { identity: String },
    ListServices,
    ListProviders,
    DaemonVersion,
    NodeStatus,
    KeyAddress { key_name: String },
    Balance { address: String },
    SubmitBond(BondTransaction),
    SubmitMetadata(MetadataTransaction),
}

#[derive(Default)]
struct ScriptState {
    public_keys: HashMap<String, String>,
    encodings: HashMap<String, String>,
    registered: HashSet<(String, String)>,
    services: Option<Vec<ServiceEntry>>,
    providers: Vec<Value>,
    addresses: HashMap<String, String>,
    balances: HashMap<String, Value>,
    node_status: Option<Value>,
    sequences: VecDeque<Result<Option<u64>>>,
    default_sequence: Option<u64>,
    bond_outcomes: VecDeque<TransactionOutcome>,
    metadata_outcomes: VecDeque<TransactionOutcome>,
    query_delay: Option<Duration>,
    submit_delay: Option<Duration>,
    calls: Vec<ChainCall>,
}

/// Scripted chain double.
///
/// Queued replies are consumed FIFO. With an empty queue, submissions succeed
/// and sequence lookups return the default sequence. A successful bond marks
/// the pair as registered, so later lookups see it like a real ledger would.
/// Registration lookups answer from the ledger as it was when the call
/// started, before any query delay.
#[derive(Clone, Default)]
pub struct ScriptedChainClient {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local key and the encoded form its raw key converts to.
    pub fn with_key(self, key_name: &str, raw_key: &str, encoded: &str) -> Self {
        {
            let mut state = self.state.lock();
            state
                .public_keys
                .insert(key_name.to_string(), raw_key.to_string());
            state
                .encodings
                .insert(raw_key.to_string(), encoded.to_string());
        }
        self
    }

    /// Key whose raw form exists but cannot be converted.
    pub fn with_unencodable_key(self, key_name: &str, raw_key: &str) -> Self {
        self.state
            .lock()
            .public_keys
            .insert(key_name.to_string(), raw_key.to_string());
        self
    }

    pub fn with_services(self, services: Vec<ServiceEntry>) -> Self {
        self.state.lock().services = Some(services);
        self
    }

    pub fn with_providers(self, providers: Vec<Value>) -> Self {
        self.state.lock().providers = providers;
        self
    }

    pub fn with_registered(self, identity: &str, service: &str) -> Self {
        self.state
            .lock()
            .registered
            .insert((identity.to_string(), service.to_string()));
        self
    }

    /// Account address reported for a local key.
    pub fn with_address(self, key_name: &str, address: &str) -> Self {
        self.state
            .lock()
            .addresses
            .insert(key_name.to_string(), address.to_string());
        self
    }

    pub fn with_balance(self, address: &str, balance: Value) -> Self {
        self.state
            .lock()
            .balances
            .insert(address.to_string(), balance);
        self
    }

    /// Document returned by `status`.
    pub fn with_node_status(self, status: Value) -> Self {
        self.state.lock().node_status = Some(status);
        self
    }

    pub fn with_default_sequence(self, sequence: Option<u64>) -> Self {
        self.state.lock().default_sequence = sequence;
        self
    }

    /// Delay every query by `delay`, to exercise caller timeouts.
    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.state.lock().query_delay = Some(delay);
        self
    }

    /// Delay every submission by `delay`. The call is recorded before the
    /// delay; the outcome is only decided after it.
    pub fn with_submit_delay(self, delay: Duration) -> Self {
        self.state.lock().submit_delay = Some(delay);
        self
    }

    pub fn push_sequence(&self, reply: Result<Option<u64>>) {
        self.state.lock().sequences.push_back(reply);
    }

    pub fn push_bond_outcome(&self, exit_code: i32, output: &str) {
        self.state
            .lock()
            .bond_outcomes
            .push_back(TransactionOutcome::new(exit_code, output, Vec::new()));
    }

    pub fn push_metadata_outcome(&self, exit_code: i32, output: &str) {
        self.state
            .lock()
            .metadata_outcomes
            .push_back(TransactionOutcome::new(exit_code, output, Vec::new()));
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.state.lock().calls.clone()
    }

    pub fn bond_submissions(&self) -> Vec<BondTransaction> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChainCall::SubmitBond(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    pub fn metadata_submissions(&self) -> Vec<MetadataTransaction> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChainCall::SubmitMetadata(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    pub fn sequence_lookups(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ChainCall::AccountSequence { .. }))
            .count()
    }

    fn record(&self, call: ChainCall) -> Option<Duration> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.query_delay
    }

    async fn query(&self, call: ChainCall) {
        pause(self.record(call)).await;
    }

    fn record_submission(&self, call: ChainCall) -> Option<Duration> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.submit_delay
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn not_found(what: &str, key: &str) -> ChainError {
    ChainError::CommandFailed {
        command: format!("stub {what}"),
        exit_code: 1,
        output: format!("Error: {key}: key not found"),
    }
}

#[async_trait]
impl ChainClient for ScriptedChainClient {
    async fn public_key(&self, key_name: &str, _keyring_backend: &str) -> Result<String> {
        self.query(ChainCall::PublicKey {
            key_name: key_name.to_string(),
        })
        .await;
        self.state
            .lock()
            .public_keys
            .get(key_name)
            .cloned()
            .ok_or_else(|| not_found("keys show", key_name))
    }

    async fn encode_public_key(&self, raw_key: &str) -> Result<String> {
        self.query(ChainCall::EncodePublicKey {
            raw_key: raw_key.to_string(),
        })
        .await;
        self.state
            .lock()
            .encodings
            .get(raw_key)
            .cloned()
            .ok_or_else(|| ChainError::missing("encoded public key", "Address: 0x00"))
    }

    async fn find_provider(&self, identity: &str, service: &str) -> Result<bool> {
        let delay = self.record(ChainCall::FindProvider {
            identity: identity.to_string(),
            service: service.to_string(),
        });
        let found = self
            .state
            .lock()
            .registered
            .contains(&(identity.to_string(), service.to_string()));
        pause(delay).await;
        if found {
            Ok(true)
        } else {
            Err(not_found("query provider", identity))
        }
    }

    async fn account_sequence(&self, identity: &str) -> Result<Option<u64>> {
        self.query(ChainCall::AccountSequence {
            identity: identity.to_string(),
        })
        .await;
        let mut state = self.state.lock();
        match state.sequences.pop_front() {
            Some(reply) => reply,
            None => Ok(state.default_sequence),
        }
    }

    async fn list_services(&self) -> Result<Vec<ServiceEntry>> {
        self.query(ChainCall::ListServices).await;
        self.state
            .lock()
            .services
            .clone()
            .ok_or_else(|| ChainError::Backend("service catalog unavailable".to_string()))
    }

    async fn list_providers(&self) -> Result<Vec<Value>> {
        self.query(ChainCall::ListProviders).await;
        Ok(self.state.lock().providers.clone())
    }

    async fn daemon_version(&self) -> Result<String> {
        self.query(ChainCall::DaemonVersion).await;
        Ok("stub".to_string())
    }

    async fn node_status(&self) -> Result<NodeStatus> {
        self.query(ChainCall::NodeStatus).await;
        self.state
            .lock()
            .node_status
            .clone()
            .map(normalize::node_status_from_json)
            .ok_or_else(|| ChainError::Backend("node status unavailable".to_string()))
    }

    async fn key_address(&self, key_name: &str, _keyring_backend: &str) -> Result<String> {
        self.query(ChainCall::KeyAddress {
            key_name: key_name.to_string(),
        })
        .await;
        self.state
            .lock()
            .addresses
            .get(key_name)
            .cloned()
            .ok_or_else(|| not_found("keys show", key_name))
    }

    async fn balance(&self, address: &str) -> Result<Value> {
        self.query(ChainCall::Balance {
            address: address.to_string(),
        })
        .await;
        self.state
            .lock()
            .balances
            .get(address)
            .cloned()
            .ok_or_else(|| not_found("query bank balances", address))
    }

    async fn submit_bond(&self, tx: &BondTransaction) -> TransactionOutcome {
        let mut command = vec!["tx".to_string(), "arkeo".to_string()];
        command.extend(tx.positional_args());

        pause(self.record_submission(ChainCall::SubmitBond(tx.clone()))).await;
        let mut state = self.state.lock();
        let outcome = match state.bond_outcomes.pop_front() {
            Some(scripted) => TransactionOutcome::new(scripted.exit_code, scripted.raw_output, command),
            None => TransactionOutcome::new(0, "code: 0\ntxhash: BOND", command),
        };
        if outcome.succeeded {
            state
                .registered
                .insert((tx.identity.clone(), tx.service.clone()));
        }
        outcome
    }

    async fn submit_metadata(&self, tx: &MetadataTransaction) -> TransactionOutcome {
        let mut command = vec!["tx".to_string(), "arkeo".to_string()];
        command.extend(tx.positional_args());
        command.extend(sequence_args(tx.sequence));

        pause(self.record_submission(ChainCall::SubmitMetadata(tx.clone()))).await;
        let mut state = self.state.lock();
        match state.metadata_outcomes.pop_front() {
            Some(scripted) => TransactionOutcome::new(scripted.exit_code, scripted.raw_output, command),
            None => TransactionOutcome::new(0, "code: 0\ntxhash: MOD", command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_bond_registers_pair() {
        let stub = ScriptedChainClient::new().with_key("provider", "pk1", "addr1");
        assert!(stub.find_provider("addr1", "7").await.is_err());

        let outcome = stub
            .submit_bond(&BondTransaction {
                identity: "addr1".into(),
                service: "7".into(),
                amount: "1".into(),
                from: "provider".into(),
                fees: "200uarkeo".into(),
                keyring_backend: "test".into(),
            })
            .await;
        assert!(outcome.succeeded);
        assert!(stub.find_provider("addr1", "7").await.unwrap());
        assert_eq!(stub.bond_submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn registration_lookup_answers_from_call_start() {
        let stub = ScriptedChainClient::new().with_query_delay(Duration::from_millis(10));
        let lookup = {
            let stub = stub.clone();
            tokio::spawn(async move { stub.find_provider("addr1", "7").await })
        };
        tokio::task::yield_now().await;
        let _ = stub.clone().with_registered("addr1", "7");

        assert!(lookup.await.unwrap().is_err());
        assert!(stub.find_provider("addr1", "7").await.unwrap());
    }

    #[tokio::test]
    async fn scripted_sequences_drain_before_default() {
        let stub = ScriptedChainClient::new().with_default_sequence(Some(9));
        stub.push_sequence(Ok(None));
        stub.push_sequence(Ok(Some(4)));

        assert_eq!(stub.account_sequence("addr1").await.unwrap(), None);
        assert_eq!(stub.account_sequence("addr1").await.unwrap(), Some(4));
        assert_eq!(stub.account_sequence("addr1").await.unwrap(), Some(9));
        assert_eq!(stub.sequence_lookups(), 3);
    }
}
