//! Lenient request bodies with configured fallbacks.

use provider_bonding::{BondRequest, MetadataParams, RegistrationRequest};
use provider_chain::normalize::{first_present, value_to_string};
use serde::Serialize;
use serde_json::{Map, Value};

/// Values used when a request leaves a field out or sends it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDefaults {
    /// Local key that owns the provider identity. Not overridable per request.
    pub key_name: String,
    pub keyring_backend: String,
    pub bond: String,
    pub fees: String,
    pub sentinel_uri: String,
    pub metadata_nonce: String,
    pub status: String,
    pub min_contract_dur: String,
    pub max_contract_dur: String,
    pub subscription_rates: String,
    pub pay_as_you_go_rates: String,
    pub settlement_dur: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            key_name: "provider".to_string(),
            keyring_backend: "test".to_string(),
            bond: "1".to_string(),
            fees: "200uarkeo".to_string(),
            sentinel_uri: "http://127.0.0.1:3636/metadata.json".to_string(),
            metadata_nonce: "1".to_string(),
            status: "1".to_string(),
            min_contract_dur: "5".to_string(),
            max_contract_dur: "432000".to_string(),
            subscription_rates: "200uarkeo".to_string(),
            pay_as_you_go_rates: "200uarkeo".to_string(),
            settlement_dur: "1000".to_string(),
        }
    }
}

/// JSON object body. Anything that is not an object reads as `{}`.
#[derive(Debug, Clone, Default)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    /// Field rendered as text; null, false and empty values count as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        first_present(&self.0, &[key])
            .and_then(value_to_string)
            .filter(|value| !value.trim().is_empty())
    }

    fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    pub fn service(&self) -> Option<String> {
        self.text("service")
    }

    /// `None` when the body names no service.
    pub fn bond_request(&self, defaults: &RequestDefaults) -> Option<BondRequest> {
        Some(BondRequest {
            key_name: defaults.key_name.clone(),
            service: self.service()?,
            bond_amount: self.text_or("bond", &defaults.bond),
            fees: defaults.fees.clone(),
            keyring_backend: defaults.keyring_backend.clone(),
        })
    }

    pub fn registration_request(&self, defaults: &RequestDefaults) -> Option<RegistrationRequest> {
        Some(RegistrationRequest {
            bond: self.bond_request(defaults)?,
            metadata: MetadataParams {
                endpoint_uri: self.text_or("sentinel_uri", &defaults.sentinel_uri),
                metadata_nonce: self.text_or("metadata_nonce", &defaults.metadata_nonce),
                status: self.text_or("status", &defaults.status),
                min_contract_duration: self.text_or("min_contract_dur", &defaults.min_contract_dur),
                max_contract_duration: self.text_or("max_contract_dur", &defaults.max_contract_dur),
                subscription_rate: self
                    .text_or("subscription_rates", &defaults.subscription_rates),
                pay_as_you_go_rate: self
                    .text_or("pay_as_you_go_rates", &defaults.pay_as_you_go_rates),
                settlement_duration: self.text_or("settlement_dur", &defaults.settlement_dur),
            },
        })
    }
}
