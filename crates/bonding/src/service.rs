use crate::types::ServiceDescriptor;
use provider_chain::{with_timeout, ChainClient, ServiceEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Whether a service reference is a catalog id rather than a name.
pub fn is_numeric_reference(reference: &str) -> bool {
    let trimmed = reference.trim();
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Catalog name for `id`; the id itself when the entry carries no name.
pub fn match_service(entries: &[ServiceEntry], id: &str) -> Option<String> {
    entries
        .iter()
        .find(|entry| entry.id.as_deref() == Some(id))
        .map(|entry| entry.name.clone().unwrap_or_else(|| id.to_string()))
}

/// Maps numeric service ids to catalog names. Never fails the caller.
#[derive(Clone)]
pub struct ServiceNameResolver {
    client: Arc<dyn ChainClient>,
    call_timeout: Duration,
}

impl ServiceNameResolver {
    pub fn new(client: Arc<dyn ChainClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    pub async fn resolve(&self, reference: &str) -> ServiceDescriptor {
        if !is_numeric_reference(reference) {
            return ServiceDescriptor::passthrough(reference);
        }

        let id = reference.trim();
        match with_timeout(self.call_timeout, "service catalog", self.client.list_services()).await
        {
            Ok(entries) => match match_service(&entries, id) {
                Some(name) => ServiceDescriptor::resolved(reference, name),
                None => {
                    warn!("service id {} not present in catalog", id);
                    ServiceDescriptor::unresolved(reference, id)
                }
            },
            Err(err) => {
                warn!("service catalog lookup failed: {}", err);
                ServiceDescriptor::unresolved(reference, id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_chain::{ChainCall, ScriptedChainClient};

    #[test]
    fn numeric_detection() {
        assert!(is_numeric_reference("7"));
        assert!(is_numeric_reference(" 42 "));
        assert!(!is_numeric_reference(""));
        assert!(!is_numeric_reference("-1"));
        assert!(!is_numeric_reference("btc-mainnet-fullnode"));
        assert!(!is_numeric_reference("٣"));
    }

    #[tokio::test]
    async fn names_pass_through_without_lookup() {
        let stub = ScriptedChainClient::new();
        let resolver = ServiceNameResolver::new(Arc::new(stub.clone()), Duration::from_secs(1));
        let descriptor = resolver.resolve("btc-mainnet-fullnode").await;
        assert_eq!(descriptor.resolved_name, "btc-mainnet-fullnode");
        assert!(descriptor.resolution_note.is_none());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn numeric_id_resolves_to_catalog_name() {
        let stub = ScriptedChainClient::new().with_services(vec![
            ServiceEntry::new("5", "eth-mainnet-fullnode"),
            ServiceEntry::new("7", "btc-mainnet-fullnode"),
        ]);
        let resolver = ServiceNameResolver::new(Arc::new(stub.clone()), Duration::from_secs(1));
        let descriptor = resolver.resolve("7").await;
        assert_eq!(descriptor.requested_id, "7");
        assert_eq!(descriptor.resolved_name, "btc-mainnet-fullnode");
        assert_eq!(stub.calls(), vec![ChainCall::ListServices]);
    }

    #[tokio::test]
    async fn unknown_id_keeps_reference_with_note() {
        let stub = ScriptedChainClient::new().with_services(vec![ServiceEntry::new("5", "eth")]);
        let resolver = ServiceNameResolver::new(Arc::new(stub), Duration::from_secs(1));
        let descriptor = resolver.resolve("7").await;
        assert_eq!(descriptor.resolved_name, "7");
        assert!(descriptor.resolution_note.is_some());
    }

    #[tokio::test]
    async fn catalog_failure_keeps_reference_with_note() {
        let resolver =
            ServiceNameResolver::new(Arc::new(ScriptedChainClient::new()), Duration::from_secs(1));
        let descriptor = resolver.resolve("7").await;
        assert_eq!(descriptor, ServiceDescriptor::unresolved("7", "7"));
    }

    #[tokio::test]
    async fn padded_id_note_uses_trimmed_id() {
        let resolver =
            ServiceNameResolver::new(Arc::new(ScriptedChainClient::new()), Duration::from_secs(1));
        let descriptor = resolver.resolve(" 7 ").await;
        assert_eq!(descriptor.requested_id, " 7 ");
        assert_eq!(
            descriptor.resolution_note.as_deref(),
            Some("could not resolve service id 7 to name")
        );
    }
}
