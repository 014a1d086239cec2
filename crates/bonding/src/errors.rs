use crate::types::{BondPhase, ProviderIdentity, RecoveryAttempt, ServiceDescriptor};
use provider_chain::TransactionOutcome;
use serde::Serialize;
use thiserror::Error;

/// State accumulated before a terminal submission failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub identity: ProviderIdentity,
    pub service: ServiceDescriptor,
    /// Bond phase, when the failure happened after it completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond: Option<BondPhase>,
    /// The submission that failed, with its command line and raw output.
    pub failed: TransactionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryAttempt>,
}

/// Errors that end a bond or registration run.
#[derive(Error, Debug)]
pub enum BondingError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("could not read public key for `{key_name}` ({keyring_backend}): {detail}")]
    IdentityUnavailable {
        key_name: String,
        keyring_backend: String,
        detail: String,
    },

    #[error("could not encode public key {raw_public_key}: {detail}")]
    EncodingUnavailable {
        raw_public_key: String,
        detail: String,
    },

    #[error("failed to bond provider")]
    BondSubmissionFailed(Box<FailureContext>),

    #[error("failed to mod provider")]
    MetadataSubmissionFailed(Box<FailureContext>),

    #[error("failed to mod provider after sequence mismatch recovery")]
    SequenceMismatchRecoveryExhausted(Box<FailureContext>),
}

impl BondingError {
    /// Submission context for the failures that reached the chain.
    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            BondingError::BondSubmissionFailed(ctx)
            | BondingError::MetadataSubmissionFailed(ctx)
            | BondingError::SequenceMismatchRecoveryExhausted(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Short label used for metrics and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            BondingError::MissingField(_) => "missing_field",
            BondingError::IdentityUnavailable { .. } => "identity_unavailable",
            BondingError::EncodingUnavailable { .. } => "encoding_unavailable",
            BondingError::BondSubmissionFailed(_) => "bond_submission_failed",
            BondingError::MetadataSubmissionFailed(_) => "metadata_submission_failed",
            BondingError::SequenceMismatchRecoveryExhausted(_) => {
                "sequence_mismatch_recovery_exhausted"
            }
        }
    }

    /// Whether the request itself was malformed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BondingError::MissingField(_))
    }
}

pub type Result<T> = std::result::Result<T, BondingError>;
