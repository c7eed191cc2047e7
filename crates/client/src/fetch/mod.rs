//! Origin access for intercepted requests.
//!
//! ### Forwarding
//! - Method, headers and body are preserved; hop-by-hop headers are dropped.
//! - Same-origin URLs are rewritten onto the configured upstream, so the
//!   proxy can front an origin that listens elsewhere. Request keys keep
//!   the public URL.
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 5MB (configurable), enforced while streaming
//!
//! Every HTTP status comes back as a response. Only transport problems
//! (connect failures, resets, timeouts, oversized bodies) are errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Method};
use url::Url;

use precache_core::request::is_hop_by_hop;
use precache_core::{AppConfig, CachedResponse, Error, InterceptedRequest};

/// Something that can answer intercepted requests on behalf of the origin.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn send(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Default user agent (default: "precache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Public origin whose requests are redirected to `upstream`.
    pub origin: Option<Url>,

    /// Where same-origin requests are actually sent.
    pub upstream: Option<Url>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "precache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            origin: None,
            upstream: None,
        }
    }
}

impl FetchConfig {
    /// Build from the application config.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let upstream = config.upstream_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            origin: Some(origin),
            upstream: Some(upstream),
        })
    }
}

/// reqwest-backed origin client.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// The URL a request is actually sent to.
    pub fn target_url(&self, url: &Url) -> Result<Url, Error> {
        let (Some(origin), Some(upstream)) = (&self.config.origin, &self.config.upstream) else {
            return Ok(url.clone());
        };
        if url.origin() != origin.origin() {
            return Ok(url.clone());
        }

        let mut target = url.clone();
        let rewrite_failed = |what: &str| Error::InvalidUrl(format!("cannot rewrite {what} of {url} onto {upstream}"));
        target.set_scheme(upstream.scheme()).map_err(|_| rewrite_failed("scheme"))?;
        target.set_host(upstream.host_str()).map_err(|_| rewrite_failed("host"))?;
        target.set_port(upstream.port()).map_err(|_| rewrite_failed("port"))?;
        Ok(target)
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn read_body(&self, mut response: reqwest::Response, url: &Url) -> Result<Bytes, Error> {
        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{url}: {len} bytes exceeds {}", self.config.max_bytes)));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| transport_error(&e))? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("{url}: body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn transport_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() { Error::Transport(format!("timeout: {err}")) } else { Error::Transport(format!("network error: {err}")) }
}

#[async_trait]
impl Origin for FetchClient {
    async fn send(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        let start = Instant::now();
        let target = self.target_url(&request.url)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.http.request(method, target.as_str());
        for (name, value) in &request.headers {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let body = self.read_body(response, &target).await?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            target = %target,
            status,
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "origin responded"
        );

        Ok(CachedResponse { status, headers, body })
    }
}
