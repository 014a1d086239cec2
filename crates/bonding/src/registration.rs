use crate::types::{ProviderIdentity, ServiceDescriptor};
use provider_chain::{with_timeout, ChainClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Registered,
    /// Includes failed lookups; `lookup_error` keeps their text.
    NotRegistered { lookup_error: Option<String> },
}

impl RegistrationState {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered)
    }
}

/// Point lookup of an existing provider record.
///
/// A lookup error counts as "not registered": the chain reports a missing
/// record as a failing query, and the bond submission that follows surfaces
/// any real problem.
#[derive(Clone)]
pub struct RegistrationStateChecker {
    client: Arc<dyn ChainClient>,
    call_timeout: Duration,
}

impl RegistrationStateChecker {
    pub fn new(client: Arc<dyn ChainClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    pub async fn check(
        &self,
        identity: &ProviderIdentity,
        service: &ServiceDescriptor,
    ) -> RegistrationState {
        let lookup = with_timeout(
            self.call_timeout,
            "provider lookup",
            self.client
                .find_provider(&identity.encoded_public_key, &service.resolved_name),
        )
        .await;

        match lookup {
            Ok(true) => RegistrationState::Registered,
            Ok(false) => RegistrationState::NotRegistered { lookup_error: None },
            Err(err) => {
                debug!(
                    "provider lookup for {} / {} failed: {}",
                    identity.encoded_public_key, service.resolved_name, err
                );
                RegistrationState::NotRegistered {
                    lookup_error: Some(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_chain::ScriptedChainClient;

    fn identity() -> ProviderIdentity {
        ProviderIdentity {
            raw_public_key: "pk1".into(),
            encoded_public_key: "addr1".into(),
        }
    }

    #[tokio::test]
    async fn existing_record_is_registered() {
        let stub = ScriptedChainClient::new().with_registered("addr1", "btc");
        let checker = RegistrationStateChecker::new(Arc::new(stub), Duration::from_secs(1));
        let state = checker
            .check(&identity(), &ServiceDescriptor::passthrough("btc"))
            .await;
        assert!(state.is_registered());
    }

    #[tokio::test]
    async fn lookup_error_means_not_registered() {
        let checker =
            RegistrationStateChecker::new(Arc::new(ScriptedChainClient::new()), Duration::from_secs(1));
        let state = checker
            .check(&identity(), &ServiceDescriptor::passthrough("btc"))
            .await;
        match state {
            RegistrationState::NotRegistered { lookup_error } => {
                assert!(lookup_error.unwrap().contains("not found"))
            }
            RegistrationState::Registered => panic!("lookup error treated as registered"),
        }
    }
}
