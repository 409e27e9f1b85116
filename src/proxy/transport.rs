//! Outbound HTTP transport
//!
//! The session talks to upstreams through the [`HttpClient`] trait so tests
//! can script responses. [`ReqwestClient`] is the production adapter and
//! routes each request through the selected endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::ACCEPT_ENCODING;
use http::{HeaderMap, Method};
use tracing::{debug, instrument};
use url::Url;

use crate::error::TransportError;
use crate::models::Endpoint;

/// Fully prepared request for a single attempt
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Buffered upstream response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes one request through one endpoint
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed client with one connection pool per endpoint
///
/// Handles HTTP, HTTPS and SOCKS5 endpoints including credentials, and
/// decodes gzip, deflate and brotli bodies.
pub struct ReqwestClient {
    clients: DashMap<String, reqwest::Client>,
    connect_timeout: Duration,
}

impl ReqwestClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            connect_timeout,
        }
    }

    /// Number of per-endpoint clients built so far
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_for(&self, endpoint: &Endpoint) -> Result<reqwest::Client, TransportError> {
        if let Some(client) = self.clients.get(&endpoint.id) {
            return Ok(client.clone());
        }

        let proxy = reqwest::Proxy::all(endpoint.proxy_url())
            .map_err(|e| TransportError::Build(format!("invalid proxy {}: {}", endpoint, e)))?;

        let client = reqwest::Client::builder()
            .proxy(proxy)
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        debug!(endpoint = %endpoint, "Built upstream client");
        self.clients.insert(endpoint.id.clone(), client.clone());
        Ok(client)
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    #[instrument(skip(self, endpoint, request), fields(endpoint = %endpoint, url = %request.url))]
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let client = self.client_for(endpoint)?;

        // reqwest negotiates and decodes compression itself
        let mut headers = request.headers;
        headers.remove(ACCEPT_ENCODING);

        let mut builder = client
            .request(request.method, request.url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        debug!(status, bytes = body.len(), "Upstream responded");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::Build(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}
