//! Stealth HTTP session
//!
//! A session issues one logical request at a time through a shared
//! [`EndpointPool`]: it paces requests per domain, picks an endpoint,
//! shapes the headers, classifies the outcome and retries on another
//! endpoint until the attempt budget is spent.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::{HeaderPolicy, SessionConfig};
use crate::error::{AttemptError, Result, StealthError, TransportError};
use crate::models::{Endpoint, FailureKind};

use super::classify::{classify, Verdict};
use super::headers::build_headers;
use super::pacing::{sample_seconds, DomainPacer};
use super::pool::EndpointPool;
use super::retry::RetryTracker;
use super::transport::{HttpClient, HttpResponse, OutboundRequest};

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Merged over the generated headers, winning on conflicts
    pub headers: HeaderMap,
    /// Preferred referer, still subject to the referer probability
    pub referer: Option<String>,
    pub body: Option<Bytes>,
}

impl RequestOptions {
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Successful response plus which endpoint served it
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub endpoint_id: String,
    /// Attempts spent, including the successful one
    pub attempts: u32,
    pub response: HttpResponse,
}

impl ProxiedResponse {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.response.body
    }

    pub fn text(&self) -> String {
        self.response.text()
    }
}

pub struct StealthSession {
    pool: Arc<EndpointPool>,
    client: Arc<dyn HttpClient>,
    config: SessionConfig,
    headers: HeaderPolicy,
    pacer: DomainPacer,
    rng: StdRng,
}

impl StealthSession {
    /// Build a session from settings that already passed validation
    ///
    /// Out-of-range probabilities or delay bounds panic later, inside the
    /// header generator or pacer. Use [`StealthSession::try_new`] for
    /// settings that were not checked.
    pub fn new(
        pool: Arc<EndpointPool>,
        client: Arc<dyn HttpClient>,
        config: SessionConfig,
        headers: HeaderPolicy,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            pool,
            client,
            config,
            headers,
            pacer: DomainPacer::new(),
            rng,
        }
    }

    /// Validate `config` and `headers`, then build the session
    pub fn try_new(
        pool: Arc<EndpointPool>,
        client: Arc<dyn HttpClient>,
        config: SessionConfig,
        headers: HeaderPolicy,
    ) -> Result<Self> {
        config.validate()?;
        headers.validate()?;
        Ok(Self::new(pool, client, config, headers))
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn header_policy(&self) -> &HeaderPolicy {
        &self.headers
    }

    pub async fn get(&mut self, url: &str) -> Result<ProxiedResponse> {
        self.request(Method::GET, url, RequestOptions::default())
            .await
    }

    pub async fn post(&mut self, url: &str, body: impl Into<Bytes>) -> Result<ProxiedResponse> {
        self.request(Method::POST, url, RequestOptions::default().with_body(body))
            .await
    }

    /// Issue a request through the pool
    ///
    /// Returns the first clean 2xx response. Fails with `NoProxyAvailable`
    /// as soon as the pool has nothing selectable, or `AllAttemptsFailed`
    /// once the attempt budget is spent.
    #[instrument(skip(self, method, options), fields(method = %method, domain = tracing::field::Empty))]
    pub async fn request(
        &mut self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<ProxiedResponse> {
        let url = Url::parse(url)?;
        let domain = extract_domain(&url)?;
        tracing::Span::current().record("domain", domain.as_str());

        if let Some(wait) = self.pacer.delay_for(
            &domain,
            Instant::now(),
            self.config.per_domain_delay,
            &mut self.rng,
        ) {
            debug!(wait_ms = wait.as_millis() as u64, "Pacing request");
            tokio::time::sleep(wait).await;
        }

        let mut tracker = RetryTracker::new(self.config.max_retries_per_request);

        while let Some(attempt) = tracker.begin() {
            if attempt > 1 {
                let pause = sample_seconds(&mut self.rng, self.config.retry_jitter);
                tokio::time::sleep(pause).await;
            }

            let endpoint = match self.pool.select_for_domain(
                &domain,
                Instant::now(),
                self.config.sticky_enabled,
            ) {
                Ok(endpoint) => endpoint,
                Err(StealthError::PoolExhausted) => {
                    error!(attempt, "No endpoint available");
                    return Err(StealthError::NoProxyAvailable { domain });
                }
                Err(e) => return Err(e),
            };

            debug!(attempt, endpoint = %endpoint, "Attempting request");

            let outbound = OutboundRequest {
                method: method.clone(),
                url: url.clone(),
                headers: build_headers(
                    &mut self.rng,
                    &self.headers,
                    &domain,
                    options.referer.as_deref(),
                    &options.headers,
                ),
                body: options.body.clone(),
            };

            let result = self.execute(&endpoint, outbound).await;

            match classify(result, &self.headers) {
                Verdict::Success(response) => {
                    let now = Instant::now();
                    self.pool.record_success(&endpoint.id, now);
                    self.pacer.mark(&domain, now);
                    tracker.succeed();

                    info!(
                        attempt,
                        endpoint = %endpoint,
                        status = response.status,
                        "Request succeeded"
                    );
                    return Ok(ProxiedResponse {
                        endpoint_id: endpoint.id,
                        attempts: attempt,
                        response,
                    });
                }
                Verdict::SoftFail(err) => {
                    self.record_failed_attempt(&mut tracker, &endpoint, FailureKind::Soft, err, attempt)
                }
                Verdict::HardFail(err) => {
                    self.record_failed_attempt(&mut tracker, &endpoint, FailureKind::Hard, err, attempt)
                }
            }
        }

        let err = tracker.into_error();
        error!(error = %err, "Request failed");
        Err(err)
    }

    fn record_failed_attempt(
        &self,
        tracker: &mut RetryTracker,
        endpoint: &Endpoint,
        kind: FailureKind,
        err: AttemptError,
        attempt: u32,
    ) {
        self.pool.record_failure(&endpoint.id, kind, Instant::now());
        warn!(
            attempt,
            endpoint = %endpoint,
            kind = kind.as_str(),
            error = %err,
            "Attempt failed"
        );
        tracker.fail(kind, err);
    }

    /// One attempt bounded by the base timeout
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let timeout = self.config.base_timeout;
        tokio::time::timeout(timeout, self.client.execute(endpoint, request, timeout))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }
}

/// Lowercased host of an absolute http(s) URL
pub fn extract_domain(url: &Url) -> Result<String> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(StealthError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, url
            )))
        }
    }

    url.host_str()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_ascii_lowercase())
        .ok_or_else(|| StealthError::InvalidUrl(format!("missing host in {}", url)))
}
