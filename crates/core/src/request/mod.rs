//! Request and response captures exchanged between the interceptor,
//! the origin client and the version store.

pub mod canonical;

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

pub use canonical::{UrlError, canonicalize, resolve};

use crate::cache::hash::compute_cache_key;

/// Methods whose responses may be cached.
pub const SAFE_METHODS: &[&str] = &["GET", "HEAD"];

/// Connection-scoped headers that are never forwarded or stored.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Check whether a header name is hop-by-hop (case-insensitive).
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// An outbound request observed by the interceptor.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Uppercase HTTP method.
    pub method: String,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Set for full-page loads.
    pub navigation: bool,
    /// Request body, forwarded but never cached.
    pub body: Option<Bytes>,
}

impl InterceptedRequest {
    /// Create a request with no headers and no body.
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.to_ascii_uppercase(), url, headers: Vec::new(), navigation: false, body: None }
    }

    /// Shorthand for a plain GET subresource request.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_navigation(mut self, navigation: bool) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// GET and HEAD are the only cache-eligible methods.
    pub fn is_safe_read(&self) -> bool {
        SAFE_METHODS.contains(&self.method.as_str())
    }

    /// Store key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Normalized request identity: method plus absolute URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self { method: method.to_ascii_uppercase(), url: url.into() }
    }

    /// Rebuild a key from values that were normalized before storage.
    pub(crate) fn from_stored(method: String, url: String) -> Self {
        Self { method, url }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// SHA-256 hex digest used as the storage key.
    pub fn hash(&self) -> String {
        compute_cache_key(&self.method, &self.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A captured HTTP response: status, headers and the full body.
///
/// Cloning only bumps the body's reference count, so one capture can be
/// handed to the caller while another copy is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Status in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}
