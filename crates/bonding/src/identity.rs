use crate::errors::{BondingError, Result};
use crate::types::ProviderIdentity;
use provider_chain::{with_timeout, ChainClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Derives the provider identity of a local key. Never retries.
#[derive(Clone)]
pub struct IdentityResolver {
    client: Arc<dyn ChainClient>,
    call_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(client: Arc<dyn ChainClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    pub async fn resolve(&self, key_name: &str, keyring_backend: &str) -> Result<ProviderIdentity> {
        let unavailable = |detail: String| BondingError::IdentityUnavailable {
            key_name: key_name.to_string(),
            keyring_backend: keyring_backend.to_string(),
            detail,
        };

        let raw = with_timeout(
            self.call_timeout,
            "public key lookup",
            self.client.public_key(key_name, keyring_backend),
        )
        .await
        .map_err(|err| unavailable(err.to_string()))?;
        let raw = raw.trim().to_string();
        if raw.is_empty() {
            return Err(unavailable("empty public key".to_string()));
        }

        let encoded = with_timeout(
            self.call_timeout,
            "public key encoding",
            self.client.encode_public_key(&raw),
        )
        .await
        .map_err(|err| BondingError::EncodingUnavailable {
            raw_public_key: raw.clone(),
            detail: err.to_string(),
        })?;
        let encoded = encoded.trim().to_string();
        if encoded.is_empty() {
            return Err(BondingError::EncodingUnavailable {
                raw_public_key: raw,
                detail: "empty encoded key".to_string(),
            });
        }

        debug!("resolved key {} to {}", key_name, encoded);
        Ok(ProviderIdentity {
            raw_public_key: raw,
            encoded_public_key: encoded,
        })
    }
}
