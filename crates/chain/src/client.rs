use crate::errors::{ChainError, Result};
use crate::types::{
    BondTransaction, MetadataTransaction, NodeStatus, ServiceEntry, TransactionOutcome,
};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Chain operations the provider tooling depends on.
///
/// Queries return `Result`; submissions always produce a
/// [`TransactionOutcome`], failed or not, so callers can inspect the raw
/// output. Implementations must not retry internally.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Public key of a local key, in the node's native representation.
    async fn public_key(&self, key_name: &str, keyring_backend: &str) -> Result<String>;

    /// Convert a raw public key to the chain's encoded account form.
    async fn encode_public_key(&self, raw_key: &str) -> Result<String>;

    /// Whether a provider record exists for (identity, service).
    async fn find_provider(&self, identity: &str, service: &str) -> Result<bool>;

    /// Current account sequence, if the account reports one.
    async fn account_sequence(&self, identity: &str) -> Result<Option<u64>>;

    async fn list_services(&self) -> Result<Vec<ServiceEntry>>;

    /// Raw provider records as reported by the chain.
    async fn list_providers(&self) -> Result<Vec<Value>>;

    async fn daemon_version(&self) -> Result<String>;

    async fn node_status(&self) -> Result<NodeStatus>;

    /// Account address of a local key.
    async fn key_address(&self, key_name: &str, keyring_backend: &str) -> Result<String>;

    /// Bank balances of `address`, as JSON or `{"raw": ...}`.
    async fn balance(&self, address: &str) -> Result<Value>;

    async fn submit_bond(&self, tx: &BondTransaction) -> TransactionOutcome;

    async fn submit_metadata(&self, tx: &MetadataTransaction) -> TransactionOutcome;
}

/// Bound a chain query; dropping the inner future cancels the call.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
