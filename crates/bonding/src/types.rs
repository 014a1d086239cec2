use crate::errors::{BondingError, Result};
use provider_chain::TransactionOutcome;
use serde::{Deserialize, Serialize};

/// Public key of the provider in both representations the chain uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    #[serde(rename = "raw")]
    pub raw_public_key: String,
    /// Account-encoded key; the identity used in every chain call.
    #[serde(rename = "bech32")]
    pub encoded_public_key: String,
}

/// Service reference as requested and as it will be sent to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub requested_id: String,
    pub resolved_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

impl ServiceDescriptor {
    /// Reference used verbatim, no lookup needed.
    pub fn passthrough(reference: &str) -> Self {
        Self {
            requested_id: reference.to_string(),
            resolved_name: reference.to_string(),
            resolution_note: None,
        }
    }

    pub fn resolved(reference: &str, name: impl Into<String>) -> Self {
        Self {
            requested_id: reference.to_string(),
            resolved_name: name.into(),
            resolution_note: None,
        }
    }

    /// Lookup of catalog id `id` failed; the reference is kept as given.
    pub fn unresolved(reference: &str, id: &str) -> Self {
        Self {
            requested_id: reference.to_string(),
            resolved_name: reference.to_string(),
            resolution_note: Some(format!("could not resolve service id {id} to name")),
        }
    }
}

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BondingError::MissingField(field));
    }
    Ok(())
}

/// Inputs of a bond transaction. Values are forwarded to the chain verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRequest {
    /// Local key name that owns the provider identity.
    pub key_name: String,
    pub service: String,
    pub bond_amount: String,
    pub fees: String,
    pub keyring_backend: String,
}

impl BondRequest {
    pub fn validate(&self) -> Result<()> {
        require(&self.key_name, "key_name")?;
        require(&self.service, "service")?;
        require(&self.bond_amount, "bond")?;
        require(&self.fees, "fees")?;
        require(&self.keyring_backend, "keyring_backend")
    }
}

/// Metadata published under an existing bond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataParams {
    pub endpoint_uri: String,
    pub metadata_nonce: String,
    pub status: String,
    pub min_contract_duration: String,
    pub max_contract_duration: String,
    pub subscription_rate: String,
    pub pay_as_you_go_rate: String,
    pub settlement_duration: String,
}

impl MetadataParams {
    pub fn validate(&self) -> Result<()> {
        require(&self.endpoint_uri, "sentinel_uri")?;
        require(&self.metadata_nonce, "metadata_nonce")?;
        require(&self.status, "status")?;
        require(&self.min_contract_duration, "min_contract_dur")?;
        require(&self.max_contract_duration, "max_contract_dur")?;
        require(&self.subscription_rate, "subscription_rates")?;
        require(&self.pay_as_you_go_rate, "pay_as_you_go_rates")?;
        require(&self.settlement_duration, "settlement_dur")
    }
}

/// Bond followed by a metadata update, for one identity and service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub bond: BondRequest,
    pub metadata: MetadataParams,
}

impl RegistrationRequest {
    pub fn validate(&self) -> Result<()> {
        self.bond.validate()?;
        self.metadata.validate()
    }
}

/// Account sequence together with the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountSequence {
    pub value: u64,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BondPhase {
    Submitted { outcome: TransactionOutcome },
    Skipped { reason: String },
}

impl BondPhase {
    pub fn is_skipped(&self) -> bool {
        matches!(self, BondPhase::Skipped { .. })
    }

    pub fn outcome(&self) -> Option<&TransactionOutcome> {
        match self {
            BondPhase::Submitted { outcome } => Some(outcome),
            BondPhase::Skipped { .. } => None,
        }
    }
}

/// Where the sequence for a resubmission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceSource {
    /// Parsed from the mismatch error text.
    ReportedByChain,
    Refetched,
    /// Neither worked; the chain client picks the sequence.
    Unknown,
}

/// The single resubmission after an account sequence mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryAttempt {
    /// First submission, rejected with the mismatch marker.
    pub mismatched: TransactionOutcome,
    pub source: SequenceSource,
    pub sequence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataPhase {
    /// Final submission: the resubmission when recovery ran.
    pub outcome: TransactionOutcome,
    pub sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryAttempt>,
}

impl MetadataPhase {
    pub fn recovered(&self) -> bool {
        self.recovery.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub identity: ProviderIdentity,
    pub service: ServiceDescriptor,
    pub bond: BondPhase,
    pub metadata: MetadataPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondReport {
    pub identity: ProviderIdentity,
    pub service: ServiceDescriptor,
    pub bond: BondPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bond_request() -> BondRequest {
        BondRequest {
            key_name: "provider".into(),
            service: "btc-mainnet-fullnode".into(),
            bond_amount: "1".into(),
            fees: "200uarkeo".into(),
            keyring_backend: "test".into(),
        }
    }

    #[test]
    fn blank_service_is_rejected() {
        let mut request = bond_request();
        assert!(request.validate().is_ok());

        request.service = "   ".into();
        assert!(matches!(
            request.validate(),
            Err(BondingError::MissingField("service"))
        ));
    }

    #[test]
    fn unresolved_descriptor_keeps_reference() {
        let descriptor = ServiceDescriptor::unresolved(" 7 ", "7");
        assert_eq!(descriptor.requested_id, " 7 ");
        assert_eq!(descriptor.resolved_name, " 7 ");
        assert_eq!(
            descriptor.resolution_note.as_deref(),
            Some("could not resolve service id 7 to name")
        );
    }

    #[test]
    fn bond_phase_serializes_with_status_tag() {
        let phase = BondPhase::Skipped {
            reason: "already registered".into(),
        };
        let json = serde_json::to_value(&phase).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "already registered");
    }

    #[test]
    fn identity_serializes_with_chain_field_names() {
        let identity = ProviderIdentity {
            raw_public_key: "pk1".into(),
            encoded_public_key: "addr1".into(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["raw"], "pk1");
        assert_eq!(json["bech32"], "addr1");
    }
}
