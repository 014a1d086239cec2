//! HTTP admin API for provider bonding.

pub mod payload;
pub mod sentinel;
pub mod server;

pub use payload::{Payload, RequestDefaults};
pub use sentinel::{SentinelClient, SentinelDocument, SENTINEL_FETCH_TIMEOUT};
pub use server::{build_router, start_server, AppState};
