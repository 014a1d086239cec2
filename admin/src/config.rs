use anyhow::{Context, Result};
use ::config::{Config, Environment, File as ConfigFile};
use provider_admin_api::RequestDefaults;
use provider_bonding::{OrchestratorTimings, RetryPolicy};
use provider_chain::ArkeodSettings;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "config/provider.toml";
const DEFAULT_NODE: &str = "tcp://provider1.innovationtheory.com:26657";
const DEFAULT_SENTINEL_PORT: &str = "3636";
const DEFAULT_SENTINEL_BIND_HOST: &str = "127.0.0.1";

/// Settings resolved once at startup and handed out by value.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub arkeod: ArkeodSettings,
    pub defaults: RequestDefaults,
    pub timings: OrchestratorTimings,
    pub api_host: String,
    pub api_port: u16,
    pub log_level: String,
    pub log_format: String,
    pub prometheus_enabled: bool,
}

impl AppConfig {
    /// Optional TOML file layered under `PROVIDER_*` environment variables.
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            path.exists().then_some(path)
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(Environment::with_prefix("PROVIDER"));
        let config = builder.build()?;

        Self::from_config(&config)
    }

    fn from_config(config: &Config) -> Result<Self> {
        let node = get_string_value(
            config,
            &[
                "ARKEOD_NODE",
                "arkeod_node",
                "EXTERNAL_ARKEOD_NODE",
                "external_arkeod_node",
                "arkeod.node",
            ],
        )
        .map(|node| strip_quotes(&node))
        .unwrap_or_else(|| DEFAULT_NODE.to_string());
        let chain_id = get_string_value(
            config,
            &[
                "CHAIN_ID",
                "chain_id",
                "ARKEOD_CHAIN_ID",
                "arkeod_chain_id",
                "arkeod.chain_id",
            ],
        )
        .map(|chain_id| strip_quotes(&chain_id));

        let arkeod = ArkeodSettings {
            binary: get_string_value(config, &["ARKEOD_BIN", "arkeod_bin", "arkeod.binary"])
                .unwrap_or_else(|| "arkeod".to_string()),
            home: get_string_value(config, &["ARKEOD_HOME", "arkeod_home", "arkeod.home"])
                .unwrap_or_else(|| "/root/.arkeod".to_string()),
            node: Some(node).filter(|node| !node.is_empty()),
            chain_id: chain_id.filter(|chain_id| !chain_id.is_empty()),
        };

        let builtin = RequestDefaults::default();
        let text = |keys: &[&str], fallback: &str| {
            get_string_value(config, keys).unwrap_or_else(|| fallback.to_string())
        };
        let sentinel_uri = get_string_value(config, &["SENTINEL_URI", "sentinel_uri", "sentinel.uri"])
            .unwrap_or_else(|| {
                build_sentinel_uri(
                    get_string_value(config, &["SENTINEL_NODE", "sentinel_node", "sentinel.node"])
                        .as_deref(),
                    get_string_value(config, &["SENTINEL_PORT", "sentinel_port", "sentinel.port"])
                        .as_deref(),
                    get_string_value(
                        config,
                        &["SENTINEL_BIND_HOST", "sentinel_bind_host", "sentinel.bind_host"],
                    )
                    .as_deref(),
                )
            });
        let defaults = RequestDefaults {
            key_name: text(&["KEY_NAME", "key_name", "key.name"], &builtin.key_name),
            keyring_backend: text(
                &["KEY_KEYRING_BACKEND", "key_keyring_backend", "key.keyring_backend"],
                &builtin.keyring_backend,
            ),
            bond: text(&["BOND_AMOUNT", "bond_amount", "defaults.bond"], &builtin.bond),
            fees: text(&["TX_FEES", "tx_fees", "defaults.fees"], &builtin.fees),
            sentinel_uri,
            metadata_nonce: text(
                &["METADATA_NONCE", "metadata_nonce", "defaults.metadata_nonce"],
                &builtin.metadata_nonce,
            ),
            status: text(&["STATUS", "status", "defaults.status"], &builtin.status),
            min_contract_dur: text(
                &["MIN_CONTRACT_DUR", "min_contract_dur", "defaults.min_contract_dur"],
                &builtin.min_contract_dur,
            ),
            max_contract_dur: text(
                &["MAX_CONTRACT_DUR", "max_contract_dur", "defaults.max_contract_dur"],
                &builtin.max_contract_dur,
            ),
            subscription_rates: text(
                &["SUBSCRIPTION_RATES", "subscription_rates", "defaults.subscription_rates"],
                &builtin.subscription_rates,
            ),
            pay_as_you_go_rates: text(
                &["PAY_AS_YOU_GO_RATES", "pay_as_you_go_rates", "defaults.pay_as_you_go_rates"],
                &builtin.pay_as_you_go_rates,
            ),
            settlement_dur: text(
                &["SETTLEMENT_DUR", "settlement_dur", "defaults.settlement_dur"],
                &builtin.settlement_dur,
            ),
        };

        let base = OrchestratorTimings::default();
        let jitter = Duration::from_millis(get_u64_value(
            config,
            &["RETRY_JITTER_MS", "retry_jitter_ms", "timing.retry_jitter_ms"],
            0,
        )?);
        let timings = OrchestratorTimings {
            call_timeout: Duration::from_secs(get_u64_value(
                config,
                &["CALL_TIMEOUT_SECS", "call_timeout_secs", "timing.call_timeout_secs"],
                base.call_timeout.as_secs(),
            )?),
            settle_delay: Duration::from_millis(get_u64_value(
                config,
                &["SETTLE_DELAY_MS", "settle_delay_ms", "timing.settle_delay_ms"],
                base.settle_delay.as_millis() as u64,
            )?),
            sequence_policy: RetryPolicy::fixed(
                u32::try_from(get_u64_value(
                    config,
                    &["SEQUENCE_ATTEMPTS", "sequence_attempts", "timing.sequence_attempts"],
                    u64::from(base.sequence_policy.max_attempts),
                )?)
                .context("SEQUENCE_ATTEMPTS out of range")?,
                Duration::from_millis(get_u64_value(
                    config,
                    &["SEQUENCE_DELAY_MS", "sequence_delay_ms", "timing.sequence_delay_ms"],
                    base.sequence_policy.delay.as_millis() as u64,
                )?),
            )
            .with_jitter(jitter),
            recovery_pause: Duration::from_millis(get_u64_value(
                config,
                &["RECOVERY_PAUSE_MS", "recovery_pause_ms", "timing.recovery_pause_ms"],
                base.recovery_pause.as_millis() as u64,
            )?),
            recovery_policy: RetryPolicy::fixed(
                u32::try_from(get_u64_value(
                    config,
                    &["RECOVERY_ATTEMPTS", "recovery_attempts", "timing.recovery_attempts"],
                    u64::from(base.recovery_policy.max_attempts),
                )?)
                .context("RECOVERY_ATTEMPTS out of range")?,
                Duration::from_millis(get_u64_value(
                    config,
                    &["RECOVERY_DELAY_MS", "recovery_delay_ms", "timing.recovery_delay_ms"],
                    base.recovery_policy.delay.as_millis() as u64,
                )?),
            )
            .with_jitter(jitter),
        };

        let api_port = u16::try_from(get_u64_value(
            config,
            &["ADMIN_API_PORT", "admin_api_port", "API_PORT", "api_port", "api.port"],
            9999,
        )?)
        .context("admin API port out of range")?;

        Ok(Self {
            arkeod,
            defaults,
            timings,
            api_host: get_string_value(config, &["API_HOST", "api_host", "api.host"])
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port,
            log_level: get_string_value(config, &["LOG_LEVEL", "log_level", "logging.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(config, &["LOG_FORMAT", "log_format", "logging.format"])
                .unwrap_or_else(|| "pretty".to_string()),
            prometheus_enabled: get_bool_value(
                config,
                &["PROMETHEUS_ENABLED", "prometheus_enabled", "metrics.enabled"],
                true,
            ),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.arkeod.binary.trim().is_empty() {
            anyhow::bail!("ARKEOD_BIN must not be empty");
        }
        if self.arkeod.home.trim().is_empty() {
            anyhow::bail!("ARKEOD_HOME must not be empty");
        }
        if self.defaults.key_name.trim().is_empty() {
            anyhow::bail!("KEY_NAME must not be empty");
        }
        if self.api_port == 0 {
            anyhow::bail!("ADMIN_API_PORT must be greater than zero");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!(
                "LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                self.log_format
            );
        }
        if self.timings.call_timeout.is_zero() {
            anyhow::bail!("CALL_TIMEOUT_SECS must be greater than zero");
        }
        if self.timings.sequence_policy.max_attempts == 0 {
            anyhow::bail!("SEQUENCE_ATTEMPTS must be at least 1");
        }
        if self.timings.recovery_policy.max_attempts == 0 {
            anyhow::bail!("RECOVERY_ATTEMPTS must be at least 1");
        }
        Url::parse(&self.defaults.sentinel_uri).with_context(|| {
            format!(
                "SENTINEL_URI '{}' is not a valid URL",
                self.defaults.sentinel_uri
            )
        })?;
        Ok(())
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Remove one pair of matching surrounding quotes.
pub fn strip_quotes(value: &str) -> String {
    let trimmed = value.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && matches!(bytes[0], b'"' | b'\'')
    {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}

/// `<scheme>://<host[:port]>/metadata.json` for the sentinel metadata endpoint.
///
/// An external node keeps its own scheme and port; otherwise the local bind
/// host is used over plain http.
pub fn build_sentinel_uri(node: Option<&str>, port: Option<&str>, bind_host: Option<&str>) -> String {
    let port = port
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .unwrap_or(DEFAULT_SENTINEL_PORT);

    if let Some(node) = node.map(str::trim).filter(|node| !node.is_empty()) {
        let (scheme, rest) = match node.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (scheme, rest),
            _ => ("http", node),
        };
        let host = rest.split('/').next().unwrap_or(rest);
        let host = if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
        return format!("{scheme}://{host}/metadata.json");
    }

    let host = bind_host
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .unwrap_or(DEFAULT_SENTINEL_BIND_HOST);
    format!("http://{host}:{port}/metadata.json")
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_u64_value(config: &Config, keys: &[&str], default: u64) -> Result<u64> {
    for key in keys {
        if let Some(raw) = get_string_value(config, &[key]) {
            return raw
                .parse::<u64>()
                .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'"));
        }
    }
    Ok(default)
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}
