//! Pool seeding from provider lists and discovery sources
//!
//! Seeding is best-effort: bad descriptors and unreachable sources are
//! logged and skipped, never returned as errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, PoolConfig};
use crate::error::{Result, StealthError};
use crate::models::{Endpoint, EndpointDescriptor, EndpointSource};
use crate::proxy::{EndpointPool, HttpClient, ReqwestClient, StealthSession};

use super::reporter;

/// Source of candidate endpoints
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Up to `limit` candidates, restricted to `country` where the source knows it
    async fn discover(
        &self,
        limit: usize,
        country: Option<&str>,
    ) -> Result<Vec<EndpointDescriptor>>;
}

/// Fetches a published proxy list over HTTP
///
/// The list is either a JSON array of descriptors or plain text with one
/// `host:port` or proxy URL per line (`#` starts a comment).
pub struct ProxyListSource {
    url: String,
    client: reqwest::Client,
    prober: Option<Prober>,
}

impl ProxyListSource {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)?;

        // Listings are fetched directly, not through the pool or a system proxy
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .no_proxy()
            .build()
            .map_err(|e| StealthError::Discovery(format!("failed to build client: {}", e)))?;

        Ok(Self {
            url,
            client,
            prober: None,
        })
    }

    /// Drop candidates that do not accept a TCP connection
    pub fn with_prober(mut self, prober: Prober) -> Self {
        self.prober = Some(prober);
        self
    }

    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StealthError::Discovery(format!("{}: {}", self.url, e)))?;

        response
            .text()
            .await
            .map_err(|e| StealthError::Discovery(format!("{}: {}", self.url, e)))
    }
}

#[async_trait]
impl DiscoverySource for ProxyListSource {
    fn name(&self) -> &'static str {
        "proxy-list"
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn discover(
        &self,
        limit: usize,
        country: Option<&str>,
    ) -> Result<Vec<EndpointDescriptor>> {
        let body = self.fetch().await?;

        let mut candidates: Vec<EndpointDescriptor> = parse_listing(&body)
            .into_iter()
            .filter(|d| matches_country(d, country))
            .collect();

        if let Some(prober) = &self.prober {
            candidates = prober.probe(candidates).await;
        }

        candidates.truncate(limit);
        debug!(count = candidates.len(), "Discovered candidates");
        Ok(candidates)
    }
}

/// Parse a proxy listing body, skipping entries that do not parse
pub fn parse_listing(body: &str) -> Vec<EndpointDescriptor> {
    if body.trim_start().starts_with('[') {
        let values: Vec<serde_json::Value> = match serde_json::from_str(body) {
            Ok(values) => values,
            Err(e) => {
                warn!("Malformed JSON proxy listing: {}", e);
                return Vec::new();
            }
        };

        return values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!("Skipping invalid descriptor: {}", e);
                    None
                }
            })
            .collect();
    }

    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match EndpointDescriptor::parse(line) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("Skipping proxy line: {}", e);
                None
            }
        })
        .collect()
}

/// Candidates without a country tag pass any filter
fn matches_country(descriptor: &EndpointDescriptor, country: Option<&str>) -> bool {
    match (country, descriptor.country.as_deref()) {
        (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
        _ => true,
    }
}

/// Bounded-concurrency TCP reachability check
#[derive(Debug, Clone)]
pub struct Prober {
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for Prober {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            concurrency: 20,
        }
    }
}

impl Prober {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self {
            timeout,
            concurrency,
        }
    }

    /// Keep the candidates that accept a connection, preserving input order
    pub async fn probe(&self, candidates: Vec<EndpointDescriptor>) -> Vec<EndpointDescriptor> {
        let total = candidates.len();

        let mut results = futures::stream::iter(candidates.into_iter().enumerate())
            .map(|(index, descriptor)| async move {
                let reachable = self.is_reachable(&descriptor).await;
                (index, descriptor, reachable)
            })
            .buffer_unordered(self.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        results.sort_by_key(|(index, _, _)| *index);
        let reachable: Vec<EndpointDescriptor> = results
            .into_iter()
            .filter_map(|(_, descriptor, ok)| ok.then_some(descriptor))
            .collect();

        info!(
            "Probe complete: {} reachable, {} unreachable",
            reachable.len(),
            total - reachable.len()
        );
        reachable
    }

    async fn is_reachable(&self, descriptor: &EndpointDescriptor) -> bool {
        let target = (descriptor.host.as_str(), descriptor.port);
        match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("{}:{} unreachable: {}", descriptor.host, descriptor.port, e);
                false
            }
            Err(_) => {
                debug!("{}:{} connect timed out", descriptor.host, descriptor.port);
                false
            }
        }
    }
}

/// What a seeding run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub provider_added: usize,
    pub discovered_added: usize,
    /// Descriptors that failed validation
    pub invalid: usize,
    /// Duplicates and candidates refused by a full pool
    pub not_added: usize,
    /// Set when discovery was attempted and failed
    pub discovery_error: Option<String>,
}

impl SeedReport {
    pub fn total_added(&self) -> usize {
        self.provider_added + self.discovered_added
    }
}

/// Populate `pool` from provider data or, when none is given, from `discovery`
#[instrument(skip_all, fields(limit = limit, country = ?country))]
pub async fn seed(
    pool: &EndpointPool,
    provider: Option<&[EndpointDescriptor]>,
    discovery: Option<&dyn DiscoverySource>,
    limit: usize,
    country: Option<&str>,
) -> SeedReport {
    let mut report = SeedReport::default();

    if let Some(descriptors) = provider.filter(|d| !d.is_empty()) {
        report.provider_added = add_descriptors(
            pool,
            descriptors.iter().cloned(),
            EndpointSource::Provider,
            &mut report,
        );
        info!("Integrated {} provider endpoints", report.provider_added);
        return report;
    }

    let Some(source) = discovery else {
        warn!("No provider data and no discovery source configured, pool left empty");
        return report;
    };

    match source.discover(limit, country).await {
        Ok(descriptors) => {
            report.discovered_added = add_descriptors(
                pool,
                descriptors.into_iter().take(limit),
                EndpointSource::Discovered,
                &mut report,
            );
            info!(
                source = source.name(),
                "Discovered {} endpoints", report.discovered_added
            );
        }
        Err(e) => {
            warn!(source = source.name(), "Discovery unavailable: {}", e);
            report.discovery_error = Some(e.to_string());
        }
    }

    report
}

fn add_descriptors(
    pool: &EndpointPool,
    descriptors: impl Iterator<Item = EndpointDescriptor>,
    source: EndpointSource,
    report: &mut SeedReport,
) -> usize {
    let mut added = 0;
    for descriptor in descriptors {
        match Endpoint::from_descriptor(descriptor, source) {
            Ok(endpoint) => {
                if pool.add(endpoint).is_inserted() {
                    added += 1;
                } else {
                    report.not_added += 1;
                }
            }
            Err(e) => {
                warn!("Skipping invalid endpoint descriptor: {}", e);
                report.invalid += 1;
            }
        }
    }
    added
}

/// Build a seeded session wired to the reqwest transport
///
/// `provider` takes precedence over `config.discovery.provider`. Discovery
/// runs only when `config.discovery.source_url` is set and no provider
/// data was supplied. An unusable discovery URL is logged and skipped.
pub async fn get_session(
    config: Config,
    provider: Option<Vec<EndpointDescriptor>>,
) -> Result<StealthSession> {
    config.validate()?;

    let discovery: Option<Arc<dyn DiscoverySource>> = match &config.discovery.source_url {
        Some(url) => match ProxyListSource::new(url.clone(), config.session.base_timeout) {
            Ok(mut source) => {
                if config.discovery.probe_enabled {
                    source = source.with_prober(Prober::new(
                        config.discovery.probe_timeout,
                        config.discovery.probe_concurrency,
                    ));
                }
                Some(Arc::new(source))
            }
            Err(e) => {
                warn!(url = %url, "Discovery source unusable, skipping: {}", e);
                None
            }
        },
        None => None,
    };

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::default());
    get_session_with(config, provider, client, discovery).await
}

/// [`get_session`] with an injected client and discovery source
pub async fn get_session_with(
    config: Config,
    provider: Option<Vec<EndpointDescriptor>>,
    client: Arc<dyn HttpClient>,
    discovery: Option<Arc<dyn DiscoverySource>>,
) -> Result<StealthSession> {
    config.validate()?;

    // Baseline size is pool_limit; the pool may hold up to three times that
    let pool = Arc::new(EndpointPool::new(PoolConfig {
        max_size: config.session.pool_limit.saturating_mul(3),
        ..config.pool.clone()
    }));

    let provider = provider.unwrap_or_else(|| config.discovery.provider.clone());
    let seeded = seed(
        &pool,
        Some(provider.as_slice()),
        discovery.as_deref(),
        config.session.pool_limit,
        config.session.country_filter.as_deref(),
    )
    .await;

    let summary = reporter::report(&pool);
    info!(
        added = seeded.total_added(),
        invalid = seeded.invalid,
        total = summary.total,
        healthy = summary.healthy,
        "Endpoint pool ready"
    );
    debug!("{}", summary);

    Ok(StealthSession::new(
        pool,
        client,
        config.session,
        config.headers,
    ))
}
