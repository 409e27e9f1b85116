//! Egress machinery
//!
//! This module provides:
//! - The shared, health-scored endpoint pool with sticky domain binding
//! - Randomized browser-like headers
//! - Outcome classification and the per-request retry state machine
//! - Per-domain pacing
//! - The HTTP transport seam and the stealth session built on top of it

pub mod classify;
pub mod headers;
pub mod pacing;
pub mod pool;
pub mod retry;
pub mod session;
pub mod transport;

pub use classify::{classify, Verdict};
pub use pool::{AddOutcome, EndpointPool};
pub use retry::{AttemptState, RetryTracker};
pub use session::{ProxiedResponse, RequestOptions, StealthSession};
pub use transport::{HttpClient, HttpResponse, OutboundRequest, ReqwestClient};
