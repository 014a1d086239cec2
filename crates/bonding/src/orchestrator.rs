//! Bond and metadata registration as one idempotent operation.
//!
//! A registration run resolves the identity and service, skips the bond when
//! the provider record already exists, publishes metadata with the current
//! account sequence, and recovers once from a sequence mismatch. Runs for
//! the same identity are serialized.

use crate::errors::{BondingError, FailureContext, Result};
use crate::identity::IdentityResolver;
use crate::locks::IdentityLocks;
use crate::registration::{RegistrationState, RegistrationStateChecker};
use crate::retry::OrchestratorTimings;
use crate::sequence::{expected_sequence, is_sequence_mismatch, SequenceTracker};
use crate::service::ServiceNameResolver;
use crate::types::{
    BondPhase, BondReport, BondRequest, MetadataParams, MetadataPhase, ProviderIdentity,
    RecoveryAttempt, RegistrationReport, RegistrationRequest, SequenceSource, ServiceDescriptor,
};
use metrics::counter;
use provider_chain::{BondTransaction, ChainClient, MetadataTransaction, TransactionOutcome};
use std::sync::Arc;
use tracing::{info, warn};

pub struct BondOrchestrator {
    client: Arc<dyn ChainClient>,
    identities: IdentityResolver,
    services: ServiceNameResolver,
    registrations: RegistrationStateChecker,
    sequences: SequenceTracker,
    locks: IdentityLocks,
    timings: OrchestratorTimings,
}

impl BondOrchestrator {
    pub fn new(client: Arc<dyn ChainClient>, timings: OrchestratorTimings) -> Self {
        Self {
            identities: IdentityResolver::new(client.clone(), timings.call_timeout),
            services: ServiceNameResolver::new(client.clone(), timings.call_timeout),
            registrations: RegistrationStateChecker::new(client.clone(), timings.call_timeout),
            sequences: SequenceTracker::new(
                client.clone(),
                timings.call_timeout,
                timings.sequence_policy,
            ),
            locks: IdentityLocks::new(),
            client,
            timings,
        }
    }

    pub fn timings(&self) -> &OrchestratorTimings {
        &self.timings
    }

    /// Bond only: skipped when the provider is already registered.
    pub async fn bond(&self, request: &BondRequest) -> Result<BondReport> {
        request.validate()?;
        let (identity, service) = self.resolve(request).await?;

        let _guard = self.locks.acquire(&identity.encoded_public_key).await;
        let bond = self.bond_phase(request, &identity, &service).await?;

        Ok(BondReport {
            identity,
            service,
            bond,
        })
    }

    /// Bond when needed, then publish metadata under the bond.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationReport> {
        request.validate()?;
        let (identity, service) = self.resolve(&request.bond).await?;

        let _guard = self.locks.acquire(&identity.encoded_public_key).await;
        let bond = self.bond_phase(&request.bond, &identity, &service).await?;
        if !bond.is_skipped() && !self.timings.settle_delay.is_zero() {
            tokio::time::sleep(self.timings.settle_delay).await;
        }

        let sequence = self
            .sequences
            .fetch(&identity.encoded_public_key)
            .await
            .map(|sequence| sequence.value);
        let tx = metadata_transaction(&request.bond, &request.metadata, &identity, &service)
            .with_sequence(sequence);
        let metadata = self.metadata_phase(tx, &identity, &service, &bond).await?;

        info!(
            "registered provider {} for service {}",
            identity.encoded_public_key, service.resolved_name
        );
        Ok(RegistrationReport {
            identity,
            service,
            bond,
            metadata,
        })
    }

    async fn resolve(&self, request: &BondRequest) -> Result<(ProviderIdentity, ServiceDescriptor)> {
        let identity = self
            .identities
            .resolve(&request.key_name, &request.keyring_backend)
            .await
            .map_err(|err| {
                record_failure(&err);
                err
            })?;
        let service = self.services.resolve(&request.service).await;
        Ok((identity, service))
    }

    async fn bond_phase(
        &self,
        request: &BondRequest,
        identity: &ProviderIdentity,
        service: &ServiceDescriptor,
    ) -> Result<BondPhase> {
        if let RegistrationState::Registered =
            self.registrations.check(identity, service).await
        {
            info!(
                "provider {} already bonded for {}, skipping bond",
                identity.encoded_public_key, service.resolved_name
            );
            counter!("provider_bond_skipped_total").increment(1);
            return Ok(BondPhase::Skipped {
                reason: "provider already registered".to_string(),
            });
        }

        let tx = BondTransaction {
            identity: identity.encoded_public_key.clone(),
            service: service.resolved_name.clone(),
            amount: request.bond_amount.clone(),
            from: request.key_name.clone(),
            fees: request.fees.clone(),
            keyring_backend: request.keyring_backend.clone(),
        };
        info!(
            "submitting bond of {} for {} on {}",
            tx.amount, tx.identity, tx.service
        );
        let outcome = self.submit_bond(&tx).await;
        counter!("provider_bond_submissions_total").increment(1);

        if !outcome.succeeded {
            let err =
                BondingError::BondSubmissionFailed(failure(identity, service, None, outcome, None));
            record_failure(&err);
            return Err(err);
        }
        Ok(BondPhase::Submitted { outcome })
    }

    async fn metadata_phase(
        &self,
        tx: MetadataTransaction,
        identity: &ProviderIdentity,
        service: &ServiceDescriptor,
        bond: &BondPhase,
    ) -> Result<MetadataPhase> {
        info!(
            "submitting metadata for {} on {} (sequence {:?})",
            tx.identity, tx.service, tx.sequence
        );
        let first = self.submit_metadata(&tx).await;

        if !is_sequence_mismatch(&first.raw_output) {
            if !first.succeeded {
                let err = BondingError::MetadataSubmissionFailed(failure(
                    identity,
                    service,
                    Some(bond),
                    first,
                    None,
                ));
                record_failure(&err);
                return Err(err);
            }
            return Ok(MetadataPhase {
                outcome: first,
                sequence: tx.sequence,
                recovery: None,
            });
        }

        warn!(
            "account sequence mismatch for {}, recovering once",
            tx.identity
        );
        counter!("provider_sequence_recoveries_total").increment(1);
        if !self.timings.recovery_pause.is_zero() {
            tokio::time::sleep(self.timings.recovery_pause).await;
        }

        let (source, sequence) = self.recover_sequence(&first.raw_output, &tx.identity).await;
        let retry = tx.with_sequence(sequence);
        let outcome = self.submit_metadata(&retry).await;
        let recovery = RecoveryAttempt {
            mismatched: first,
            source,
            sequence,
        };

        if !outcome.succeeded {
            let err = BondingError::SequenceMismatchRecoveryExhausted(failure(
                identity,
                service,
                Some(bond),
                outcome,
                Some(recovery),
            ));
            record_failure(&err);
            return Err(err);
        }
        Ok(MetadataPhase {
            outcome,
            sequence,
            recovery: Some(recovery),
        })
    }

    /// Sequence named by the chain, else a fresh read.
    async fn recover_sequence(&self, output: &str, identity: &str) -> (SequenceSource, Option<u64>) {
        if let Some(expected) = expected_sequence(output) {
            return (SequenceSource::ReportedByChain, Some(expected));
        }
        match self
            .sequences
            .fetch_with(identity, &self.timings.recovery_policy)
            .await
        {
            Some(sequence) => (SequenceSource::Refetched, Some(sequence.value)),
            None => (SequenceSource::Unknown, None),
        }
    }

    async fn submit_bond(&self, tx: &BondTransaction) -> TransactionOutcome {
        let limit = self.timings.call_timeout;
        match tokio::time::timeout(limit, self.client.submit_bond(tx)).await {
            Ok(outcome) => outcome,
            Err(_) => TransactionOutcome::aborted(
                format!("bond submission timed out after {}ms", limit.as_millis()),
                tx.positional_args(),
            ),
        }
    }

    async fn submit_metadata(&self, tx: &MetadataTransaction) -> TransactionOutcome {
        counter!("provider_metadata_submissions_total").increment(1);
        let limit = self.timings.call_timeout;
        match tokio::time::timeout(limit, self.client.submit_metadata(tx)).await {
            Ok(outcome) => outcome,
            Err(_) => TransactionOutcome::aborted(
                format!("metadata submission timed out after {}ms", limit.as_millis()),
                tx.positional_args(),
            ),
        }
    }
}

fn metadata_transaction(
    bond: &BondRequest,
    params: &MetadataParams,
    identity: &ProviderIdentity,
    service: &ServiceDescriptor,
) -> MetadataTransaction {
    MetadataTransaction {
        identity: identity.encoded_public_key.clone(),
        service: service.resolved_name.clone(),
        endpoint_uri: params.endpoint_uri.clone(),
        metadata_nonce: params.metadata_nonce.clone(),
        status: params.status.clone(),
        min_contract_duration: params.min_contract_duration.clone(),
        max_contract_duration: params.max_contract_duration.clone(),
        subscription_rate: params.subscription_rate.clone(),
        pay_as_you_go_rate: params.pay_as_you_go_rate.clone(),
        settlement_duration: params.settlement_duration.clone(),
        sequence: None,
        from: bond.key_name.clone(),
        fees: bond.fees.clone(),
        keyring_backend: bond.keyring_backend.clone(),
    }
}

fn failure(
    identity: &ProviderIdentity,
    service: &ServiceDescriptor,
    bond: Option<&BondPhase>,
    failed: TransactionOutcome,
    recovery: Option<RecoveryAttempt>,
) -> Box<FailureContext> {
    Box::new(FailureContext {
        identity: identity.clone(),
        service: service.clone(),
        bond: bond.cloned(),
        failed,
        recovery,
    })
}

fn record_failure(err: &BondingError) {
    warn!("provider registration failed: {}", err);
    counter!("provider_registration_failures_total", "kind" => err.kind()).increment(1);
}
