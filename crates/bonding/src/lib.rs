//! Provider bond and metadata registration.
//!
//! [`BondOrchestrator`] turns the two non-atomic chain transactions into one
//! idempotent operation on top of any [`provider_chain::ChainClient`].

pub mod errors;
pub mod identity;
pub mod locks;
pub mod orchestrator;
pub mod registration;
pub mod retry;
pub mod sequence;
pub mod service;
pub mod types;

pub use errors::{BondingError, FailureContext, Result};
pub use identity::IdentityResolver;
pub use locks::IdentityLocks;
pub use orchestrator::BondOrchestrator;
pub use registration::{RegistrationState, RegistrationStateChecker};
pub use retry::{OrchestratorTimings, RetryPolicy};
pub use sequence::{
    expected_sequence, is_sequence_mismatch, SequenceTracker, SEQUENCE_MISMATCH_MARKER,
};
pub use service::{is_numeric_reference, ServiceNameResolver};
pub use types::*;
