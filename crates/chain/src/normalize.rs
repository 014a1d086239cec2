//! Normalization of `arkeod` query output.
//!
//! The daemon's JSON shapes vary between releases, so every concept is read
//! through an explicit list of accepted field names. Everything here is pure
//! and independent of process execution.

use crate::errors::{ChainError, Result};
use crate::types::{NodeStatus, ProviderServiceView, ServiceEntry};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

pub const SERVICE_LIST_KEYS: &[&str] = &["services", "service", "result", "data"];
pub const NESTED_SERVICE_LIST_KEYS: &[&str] = &["services", "service"];
pub const SERVICE_ID_KEYS: &[&str] = &["id", "service_id", "serviceID"];
pub const SERVICE_NAME_KEYS: &[&str] = &["service", "name", "label"];

pub const ACCOUNT_KEYS: &[&str] = &["account", "result"];

pub const PROVIDER_LIST_KEYS: &[&str] = &["provider", "providers"];
pub const PROVIDER_PUBKEY_KEYS: &[&str] = &["pub_key", "pubkey", "pubKey"];
pub const PROVIDER_SERVICE_LIST_KEYS: &[&str] = &["services", "service"];

pub const SYNC_INFO_KEYS: &[&str] = &["SyncInfo", "sync_info"];
pub const BLOCK_HEIGHT_KEYS: &[&str] = &["latest_block_height", "latest_block"];

const MIN_DURATION_KEYS: &[&str] = &["min_contract_duration", "min_contract_dur"];
const MAX_DURATION_KEYS: &[&str] = &["max_contract_duration", "max_contract_dur"];
const SUBSCRIPTION_RATE_KEYS: &[&str] = &["subscription_rate", "subscription_rates"];
const PAYGO_RATE_KEYS: &[&str] = &["pay_as_you_go_rate", "pay_as_you_go_rates"];
const SETTLEMENT_KEYS: &[&str] = &["settlement_duration", "settlement_dur"];
const METADATA_URI_KEYS: &[&str] = &["metadata_uri", "metadataUri"];
const METADATA_NONCE_KEYS: &[&str] = &["metadata_nonce", "metadataNonce"];
const PROVIDER_SERVICE_ID_KEYS: &[&str] = &["service_id", "id", "service"];
const PROVIDER_SERVICE_NAME_KEYS: &[&str] = &["service", "name"];

/// Prefix of the encoded account key line printed by `debug pubkey-raw`.
pub const ENCODED_KEY_PREFIX: &str = "Bech32 Acc:";

static SERVICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*-\s*(?P<service>[^:]+?)\s*:\s*(?P<id>[0-9]+)\s*\((?P<desc>.*)\)\s*$")
        .expect("service line pattern is valid")
});

/// Parse JSON, skipping any banner text printed before the first `{` or `[`.
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let start = [text.find('{'), text.find('[')]
        .into_iter()
        .flatten()
        .min()?;
    serde_json::from_str(&text[start..]).ok()
}

/// Render a scalar JSON value as the string the CLI would accept.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

/// First alias whose value is present and non-empty.
pub fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| is_present(value))
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(object, keys).and_then(value_to_string)
}

fn first_array<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| object.get(*key).and_then(Value::as_array))
}

/// Normalize the output of `query arkeo all-services`.
pub fn services_from_output(text: &str) -> Vec<ServiceEntry> {
    match parse_json_lenient(text) {
        Some(value) => services_from_json(&value),
        None => services_from_text(text),
    }
}

pub fn services_from_json(value: &Value) -> Vec<ServiceEntry> {
    let candidates: &[Value] = match value {
        Value::Array(items) => items,
        Value::Object(object) => service_candidates(object).map(Vec::as_slice).unwrap_or(&[]),
        _ => &[],
    };

    candidates
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let id = first_string(item, SERVICE_ID_KEYS);
            let name = first_string(item, SERVICE_NAME_KEYS);
            if id.is_none() && name.is_none() {
                return None;
            }
            Some(ServiceEntry {
                id,
                name,
                description: None,
            })
        })
        .collect()
}

fn service_candidates(object: &Map<String, Value>) -> Option<&Vec<Value>> {
    for key in SERVICE_LIST_KEYS {
        match object.get(*key) {
            Some(Value::Array(items)) => return Some(items),
            Some(Value::Object(nested)) => {
                if let Some(items) = first_array(nested, NESTED_SERVICE_LIST_KEYS) {
                    return Some(items);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fallback for the human readable listing: `- <name> : <id> (<description>)`.
pub fn services_from_text(text: &str) -> Vec<ServiceEntry> {
    text.lines()
        .filter_map(|line| SERVICE_LINE.captures(line))
        .map(|caps| ServiceEntry {
            id: Some(caps["id"].trim().to_string()),
            name: Some(caps["service"].trim().to_string()),
            description: Some(caps["desc"].trim().to_string()),
        })
        .collect()
}

/// Raw public key from `keys show <name> -p`.
pub fn raw_public_key_from_output(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("key")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Encoded account key from `debug pubkey-raw <raw>`.
pub fn encoded_public_key_from_output(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix(ENCODED_KEY_PREFIX))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Account sequence from `query auth account -o json`.
///
/// Accepts both the flat (`account.sequence`) and the wrapped
/// (`account.value.sequence`) layouts. A well-formed response without a
/// sequence yields `Ok(None)`.
pub fn sequence_from_account_output(text: &str) -> Result<Option<u64>> {
    let value: Value =
        serde_json::from_str(text).map_err(|_| ChainError::parse("account response", text))?;
    let Some(root) = value.as_object() else {
        return Ok(None);
    };
    let Some(account) = first_present(root, ACCOUNT_KEYS).and_then(Value::as_object) else {
        return Ok(None);
    };
    let inner = match account.get("value") {
        Some(Value::Object(inner)) if !inner.is_empty() => inner,
        _ => account,
    };

    match inner.get("sequence") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| ChainError::parse("account sequence", n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ChainError::parse("account sequence", s.clone())),
        Some(other) => Err(ChainError::parse("account sequence", other.to_string())),
    }
}

/// Latest block height from a parsed `status` document.
pub fn node_status_from_json(status: Value) -> NodeStatus {
    let height = status
        .as_object()
        .and_then(|root| first_present(root, SYNC_INFO_KEYS))
        .and_then(Value::as_object)
        .and_then(|sync| first_present(sync, BLOCK_HEIGHT_KEYS))
        .and_then(value_to_string);
    NodeStatus { height, status }
}

/// `arkeod status`; the document must be JSON.
pub fn node_status_from_output(text: &str) -> Result<NodeStatus> {
    let status: Value =
        serde_json::from_str(text.trim()).map_err(|_| ChainError::parse("node status", text))?;
    Ok(node_status_from_json(status))
}

/// Address printed by `keys show <name> -a`.
pub fn address_from_output(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

/// `query bank balances -o json`, kept as `{"raw": ...}` when not JSON.
pub fn balance_from_output(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|_| json!({ "raw": text }))
}

/// Provider records from `query arkeo list-providers --output json`.
pub fn providers_from_output(text: &str) -> Vec<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|root| {
            PROVIDER_LIST_KEYS
                .iter()
                .filter_map(|key| root.get(*key))
                .find(|value| is_present(value))
                .and_then(Value::as_array)
                .cloned()
        })
        .unwrap_or_default()
}

/// Services offered by the provider whose encoded key is `identity`.
pub fn provider_services(identity: &str, providers: &[Value]) -> Vec<ProviderServiceView> {
    let mut views = Vec::new();
    for provider in providers.iter().filter_map(Value::as_object) {
        let owner = first_present(provider, PROVIDER_PUBKEY_KEYS).and_then(Value::as_str);
        if owner != Some(identity) {
            continue;
        }
        match first_array(provider, PROVIDER_SERVICE_LIST_KEYS).filter(|list| !list.is_empty()) {
            Some(services) => views.extend(
                services
                    .iter()
                    .filter_map(Value::as_object)
                    .map(provider_service_view),
            ),
            None => views.push(provider_service_view(provider)),
        }
    }
    views
}

fn provider_service_view(entry: &Map<String, Value>) -> ProviderServiceView {
    let rate = |keys: &[&str]| {
        first_present(entry, keys)
            .map(rate_to_string)
            .unwrap_or_default()
    };
    ProviderServiceView {
        name: first_string(entry, PROVIDER_SERVICE_NAME_KEYS),
        id: first_string(entry, PROVIDER_SERVICE_ID_KEYS),
        service: entry.get("service").and_then(value_to_string),
        metadata_uri: first_string(entry, METADATA_URI_KEYS),
        metadata_nonce: first_string(entry, METADATA_NONCE_KEYS),
        status: entry.get("status").and_then(value_to_string),
        min_contract_dur: first_string(entry, MIN_DURATION_KEYS),
        max_contract_dur: first_string(entry, MAX_DURATION_KEYS),
        subscription_rates: rate(SUBSCRIPTION_RATE_KEYS),
        pay_as_you_go_rates: rate(PAYGO_RATE_KEYS),
        settlement_dur: first_string(entry, SETTLEMENT_KEYS),
    }
}

/// Collapse a coin or list of coins into `<amount><denom>[,...]`.
pub fn rate_to_string(value: &Value) -> String {
    fn coin(object: &Map<String, Value>) -> Option<String> {
        let amount = object.get("amount").and_then(value_to_string)?;
        let denom = object.get("denom").and_then(Value::as_str).unwrap_or("");
        Some(format!("{amount}{denom}"))
    }

    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(coin)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(object) => coin(object).unwrap_or_default(),
        other => value_to_string(other).unwrap_or_default(),
    }
}
