//! Stealth Egress - health-scored proxy pool and stealth HTTP session
//!
//! Routes outbound HTTP requests through a pool of egress proxies.
//!
//! ## Features
//!
//! - Health scoring with exponential success/failure smoothing and tiered cooldowns
//! - Sticky per-domain endpoint binding with least-recently-used spreading
//! - Capacity-bounded pool shared safely across concurrent sessions
//! - Randomized browser-like headers from a seedable weighted table
//! - Per-domain pacing and a soft/hard failure retry policy
//! - HTTP, HTTPS and SOCKS5 endpoints through a pluggable transport
//! - Seeding from provider lists or an HTTP proxy listing
//!
//! ## Example
//!
//! ```no_run
//! use stealth_egress::{get_session, Config};
//!
//! # async fn run() -> stealth_egress::Result<()> {
//! let config = Config::from_env()?;
//! let mut session = get_session(config, None).await?;
//! let response = session.get("https://example.com/").await?;
//! println!("{} via {}", response.status(), response.endpoint_id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod proxy;
pub mod services;

pub use config::Config;
pub use error::{AttemptError, Result, StealthError, TransportError};
pub use models::{Endpoint, EndpointDescriptor, EndpointProtocol, EndpointSource, PoolReport};
pub use proxy::{
    EndpointPool, HttpClient, HttpResponse, OutboundRequest, ProxiedResponse, ReqwestClient,
    RequestOptions, StealthSession,
};
pub use services::{get_session, get_session_with, report, seed, DiscoverySource, SeedReport};
