//! Provider bonding admin service.
//!
//! Serves the admin HTTP API by default; the `bond`, `register` and
//! `identity` subcommands run a single operation and print its JSON report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use provider_admin_api::{
    start_server, AppState, RequestDefaults, SentinelClient, SENTINEL_FETCH_TIMEOUT,
};
use provider_bonding::{
    BondOrchestrator, BondRequest, BondingError, IdentityResolver, MetadataParams,
    RegistrationRequest,
};
use provider_chain::{ArkeodClient, ChainClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "provider-admin")]
#[command(about = "Provider bonding admin service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/provider.toml when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// RPC endpoint of the arkeod node
    #[arg(long, global = true)]
    node: Option<String>,

    #[arg(long, global = true)]
    chain_id: Option<String>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the admin HTTP API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Bond the configured provider key to a service
    Bond {
        #[arg(long)]
        service: String,
        #[arg(long)]
        bond: Option<String>,
    },
    /// Bond when needed, then publish provider metadata
    Register(RegisterArgs),
    /// Print the provider public key in raw and encoded form
    Identity,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long)]
    service: String,
    #[arg(long)]
    bond: Option<String>,
    #[arg(long)]
    sentinel_uri: Option<String>,
    #[arg(long)]
    metadata_nonce: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    min_contract_dur: Option<String>,
    #[arg(long)]
    max_contract_dur: Option<String>,
    #[arg(long)]
    subscription_rates: Option<String>,
    #[arg(long)]
    pay_as_you_go_rates: Option<String>,
    #[arg(long)]
    settlement_dur: Option<String>,
}

impl RegisterArgs {
    fn into_request(self, defaults: &RequestDefaults) -> RegistrationRequest {
        let pick = |value: Option<String>, fallback: &str| value.unwrap_or_else(|| fallback.to_string());
        RegistrationRequest {
            bond: bond_request(defaults, self.service, self.bond),
            metadata: MetadataParams {
                endpoint_uri: pick(self.sentinel_uri, &defaults.sentinel_uri),
                metadata_nonce: pick(self.metadata_nonce, &defaults.metadata_nonce),
                status: pick(self.status, &defaults.status),
                min_contract_duration: pick(self.min_contract_dur, &defaults.min_contract_dur),
                max_contract_duration: pick(self.max_contract_dur, &defaults.max_contract_dur),
                subscription_rate: pick(self.subscription_rates, &defaults.subscription_rates),
                pay_as_you_go_rate: pick(self.pay_as_you_go_rates, &defaults.pay_as_you_go_rates),
                settlement_duration: pick(self.settlement_dur, &defaults.settlement_dur),
            },
        }
    }
}

fn bond_request(defaults: &RequestDefaults, service: String, bond: Option<String>) -> BondRequest {
    BondRequest {
        key_name: defaults.key_name.clone(),
        service,
        bond_amount: bond.unwrap_or_else(|| defaults.bond.clone()),
        fees: defaults.fees.clone(),
        keyring_backend: defaults.keyring_backend.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(node) = cli.node {
        config.arkeod.node = Some(crate::config::strip_quotes(&node)).filter(|node| !node.is_empty());
    }
    if let Some(chain_id) = cli.chain_id {
        config.arkeod.chain_id =
            Some(crate::config::strip_quotes(&chain_id)).filter(|chain_id| !chain_id.is_empty());
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });
    if let Commands::Serve { host, port } = &command {
        if let Some(host) = host {
            config.api_host = host.clone();
        }
        if let Some(port) = port {
            config.api_port = *port;
        }
    }
    config.validate()?;

    init_logging(&config)?;

    let chain: Arc<dyn ChainClient> = Arc::new(ArkeodClient::new(config.arkeod.clone()));
    let orchestrator = Arc::new(BondOrchestrator::new(chain.clone(), config.timings));

    match command {
        Commands::Serve { .. } => serve(config, chain, orchestrator).await,
        Commands::Bond { service, bond } => {
            let request = bond_request(&config.defaults, service, bond);
            let report = orchestrator.bond(&request).await.map_err(report_failure)?;
            print_json(&report)
        }
        Commands::Register(args) => {
            let request = args.into_request(&config.defaults);
            let report = orchestrator.register(&request).await.map_err(report_failure)?;
            print_json(&report)
        }
        Commands::Identity => {
            let identity = IdentityResolver::new(chain, config.timings.call_timeout)
                .resolve(&config.defaults.key_name, &config.defaults.keyring_backend)
                .await?;
            print_json(&json!({
                "user": config.defaults.key_name,
                "keyring_backend": config.defaults.keyring_backend,
                "pubkey": identity,
            }))
        }
    }
}

async fn serve(
    config: AppConfig,
    chain: Arc<dyn ChainClient>,
    orchestrator: Arc<BondOrchestrator>,
) -> Result<()> {
    info!(
        "Starting provider admin API (node: {}, home: {}, key: {})",
        config.arkeod.node.as_deref().unwrap_or("<default>"),
        config.arkeod.home,
        config.defaults.key_name
    );
    info!("Default sentinel URI: {}", config.defaults.sentinel_uri);

    let metrics = init_metrics(&config);
    let addr = config.api_addr();
    let state = AppState {
        chain,
        orchestrator,
        defaults: config.defaults,
        node: config.arkeod.node,
        metrics,
        sentinel: SentinelClient::new(SENTINEL_FETCH_TIMEOUT)?,
        start_time: Instant::now(),
    };

    tokio::select! {
        result = start_server(state, &addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

/// Print the accumulated context of a failed run before returning the error.
fn report_failure(err: BondingError) -> anyhow::Error {
    if let Some(context) = err.context() {
        match serde_json::to_string_pretty(context) {
            Ok(text) => eprintln!("{text}"),
            Err(encode_err) => warn!("could not encode failure context: {}", encode_err),
        }
    }
    anyhow::Error::new(err)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode report")?;
    println!("{text}");
    Ok(())
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_counter!(
                "provider_bond_submissions_total",
                "Bond transactions submitted to the chain"
            );
            describe_counter!(
                "provider_bond_skipped_total",
                "Bond submissions skipped because the provider was already registered"
            );
            describe_counter!(
                "provider_metadata_submissions_total",
                "Metadata transactions submitted, including resubmissions"
            );
            describe_counter!(
                "provider_sequence_recoveries_total",
                "Metadata submissions rejected with an account sequence mismatch"
            );
            describe_counter!(
                "provider_registration_failures_total",
                "Bond or registration runs that ended in a terminal error"
            );
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Reports go to stdout, so logs stay on stderr.
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install tracing subscriber")?;
    }

    Ok(())
}
