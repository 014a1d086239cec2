//! Chain access for provider tooling.
//!
//! Exposes the [`ChainClient`] trait the bonding orchestrator depends on, an
//! implementation driving the `arkeod` binary, a scripted stub, and the
//! normalization helpers that turn heterogeneous daemon output into typed
//! values.

pub mod arkeod;
pub mod client;
pub mod errors;
pub mod normalize;
pub mod stub;
pub mod types;

pub use arkeod::{ArkeodClient, ArkeodSettings};
pub use client::{with_timeout, ChainClient};
pub use errors::{ChainError, Result};
pub use stub::{ChainCall, ScriptedChainClient};
pub use types::*;
