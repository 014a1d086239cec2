//! [`ChainClient`] backed by the `arkeod` command line binary.

use crate::client::ChainClient;
use crate::errors::{ChainError, Result};
use crate::normalize;
use crate::types::{
    sequence_args, BondTransaction, MetadataTransaction, NodeStatus, ServiceEntry,
    TransactionOutcome, NO_EXIT_CODE,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

/// Connection settings for the `arkeod` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArkeodSettings {
    pub binary: String,
    pub home: String,
    /// RPC endpoint passed as `--node`; omitted when `None`.
    pub node: Option<String>,
    /// Passed as `--chain-id` on transactions; omitted when `None`.
    pub chain_id: Option<String>,
}

impl Default for ArkeodSettings {
    fn default() -> Self {
        Self {
            binary: "arkeod".to_string(),
            home: "/root/.arkeod".to_string(),
            node: None,
            chain_id: None,
        }
    }
}

#[derive(Debug)]
struct CommandOutput {
    exit_code: i32,
    output: String,
}

/// Runs `arkeod` subcommands with typed arguments.
///
/// Child processes are killed when the calling future is dropped, so a
/// caller-side timeout also cancels the command.
#[derive(Debug, Clone)]
pub struct ArkeodClient {
    settings: ArkeodSettings,
}

impl ArkeodClient {
    pub fn new(settings: ArkeodSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ArkeodSettings {
        &self.settings
    }

    fn home_args(&self) -> Vec<String> {
        vec![
            self.settings.binary.clone(),
            "--home".to_string(),
            self.settings.home.clone(),
        ]
    }

    fn node_args(&self) -> Vec<String> {
        match &self.settings.node {
            Some(node) => vec!["--node".to_string(), node.clone()],
            None => Vec::new(),
        }
    }

    fn chain_args(&self) -> Vec<String> {
        match &self.settings.chain_id {
            Some(chain_id) => vec!["--chain-id".to_string(), chain_id.clone()],
            None => Vec::new(),
        }
    }

    fn tx_command(
        &self,
        positional: Vec<String>,
        sequence: Option<u64>,
        from: &str,
        fees: &str,
        keyring_backend: &str,
    ) -> Vec<String> {
        let mut argv = self.home_args();
        argv.extend(["tx".to_string(), "arkeo".to_string()]);
        argv.extend(positional);
        argv.extend(self.node_args());
        argv.extend(self.chain_args());
        argv.extend(sequence_args(sequence));
        argv.extend(
            [
                "--from",
                from,
                "--fees",
                fees,
                "--keyring-backend",
                keyring_backend,
                "-y",
            ]
            .map(String::from),
        );
        argv
    }

    pub fn bond_command(&self, tx: &BondTransaction) -> Vec<String> {
        self.tx_command(
            tx.positional_args(),
            None,
            &tx.from,
            &tx.fees,
            &tx.keyring_backend,
        )
    }

    /// `mod-provider` command; `--sequence` sits directly before `--from`.
    pub fn metadata_command(&self, tx: &MetadataTransaction) -> Vec<String> {
        self.tx_command(
            tx.positional_args(),
            tx.sequence,
            &tx.from,
            &tx.fees,
            &tx.keyring_backend,
        )
    }

    /// Query with `--node` appended after the subcommand arguments.
    fn query_command(&self, args: &[&str]) -> Vec<String> {
        let mut argv = self.home_args();
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv.extend(self.node_args());
        argv
    }

    /// Query with `--node` placed before the subcommand.
    fn global_query_command(&self, args: &[&str]) -> Vec<String> {
        let mut argv = self.home_args();
        argv.extend(self.node_args());
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv
    }

    async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ChainError::Backend("empty command line".to_string()))?;
        debug!("running {}", argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ChainError::Spawn {
                command: argv.join(" "),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(NO_EXIT_CODE),
            output: text,
        })
    }

    async fn run_checked(&self, argv: &[String]) -> Result<String> {
        let result = self.run(argv).await?;
        if result.exit_code != 0 {
            return Err(ChainError::CommandFailed {
                command: argv.join(" "),
                exit_code: result.exit_code,
                output: result.output,
            });
        }
        Ok(result.output)
    }

    async fn submit(&self, argv: Vec<String>) -> TransactionOutcome {
        match self.run(&argv).await {
            Ok(result) => TransactionOutcome::new(result.exit_code, result.output, argv),
            Err(err) => {
                warn!("transaction command could not run: {}", err);
                TransactionOutcome::aborted(err.to_string(), argv)
            }
        }
    }
}

#[async_trait]
impl ChainClient for ArkeodClient {
    async fn public_key(&self, key_name: &str, keyring_backend: &str) -> Result<String> {
        let mut argv = self.home_args();
        argv.extend(
            ["keys", "show", key_name, "-p", "--keyring-backend", keyring_backend]
                .map(String::from),
        );
        let output = self.run_checked(&argv).await?;
        normalize::raw_public_key_from_output(&output)
            .ok_or_else(|| ChainError::parse("raw public key", output))
    }

    async fn encode_public_key(&self, raw_key: &str) -> Result<String> {
        let argv = [self.settings.binary.as_str(), "debug", "pubkey-raw", raw_key].map(String::from);
        let output = self.run_checked(&argv).await?;
        normalize::encoded_public_key_from_output(&output)
            .ok_or_else(|| ChainError::missing("encoded public key", output))
    }

    async fn find_provider(&self, identity: &str, service: &str) -> Result<bool> {
        let argv = self.query_command(&[
            "query", "arkeo", "provider", identity, service, "-o", "json",
        ]);
        let result = self.run(&argv).await?;
        if result.exit_code == 0 {
            return Ok(true);
        }
        if result.output.to_lowercase().contains("not found") {
            return Ok(false);
        }
        Err(ChainError::CommandFailed {
            command: argv.join(" "),
            exit_code: result.exit_code,
            output: result.output,
        })
    }

    async fn account_sequence(&self, identity: &str) -> Result<Option<u64>> {
        let argv = self.query_command(&["query", "auth", "account", identity, "-o", "json"]);
        let output = self.run_checked(&argv).await?;
        normalize::sequence_from_account_output(&output)
    }

    async fn list_services(&self) -> Result<Vec<ServiceEntry>> {
        let argv = self.global_query_command(&["query", "arkeo", "all-services", "-o", "json"]);
        let output = self.run_checked(&argv).await?;
        Ok(normalize::services_from_output(&output))
    }

    async fn list_providers(&self) -> Result<Vec<Value>> {
        let argv =
            self.global_query_command(&["query", "arkeo", "list-providers", "--output", "json"]);
        let output = self.run_checked(&argv).await?;
        Ok(normalize::providers_from_output(&output))
    }

    async fn daemon_version(&self) -> Result<String> {
        let argv = [self.settings.binary.as_str(), "version"].map(String::from);
        let output = self.run_checked(&argv).await?;
        let version = output.trim();
        Ok(if version.is_empty() {
            "unknown".to_string()
        } else {
            version.to_string()
        })
    }

    async fn node_status(&self) -> Result<NodeStatus> {
        let argv = self.global_query_command(&["status"]);
        let output = self.run_checked(&argv).await?;
        normalize::node_status_from_output(&output)
    }

    async fn key_address(&self, key_name: &str, keyring_backend: &str) -> Result<String> {
        let mut argv = self.home_args();
        argv.extend(
            ["--keyring-backend", keyring_backend, "keys", "show", key_name, "-a"]
                .map(String::from),
        );
        let output = self.run_checked(&argv).await?;
        normalize::address_from_output(&output)
            .ok_or_else(|| ChainError::missing("key address", output))
    }

    async fn balance(&self, address: &str) -> Result<Value> {
        let argv = self.query_command(&["query", "bank", "balances", address, "-o", "json"]);
        let output = self.run_checked(&argv).await?;
        Ok(normalize::balance_from_output(&output))
    }

    async fn submit_bond(&self, tx: &BondTransaction) -> TransactionOutcome {
        self.submit(self.bond_command(tx)).await
    }

    async fn submit_metadata(&self, tx: &MetadataTransaction) -> TransactionOutcome {
        self.submit(self.metadata_command(tx)).await
    }
}
