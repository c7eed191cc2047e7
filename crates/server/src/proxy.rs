//! HTTP front end: turns hyper requests into intercepted requests and
//! interception outcomes back into hyper responses.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use url::Url;

use precache_client::{Interception, Interceptor};
use precache_core::InterceptedRequest;
use precache_core::request::{canonicalize, is_hop_by_hop, resolve};

use crate::error::ProxyError;

/// Response header naming where the body came from.
pub const SOURCE_HEADER: &str = "x-precache-source";

pub struct Proxy {
    interceptor: Interceptor,
    origin: Url,
    max_body: usize,
}

impl Proxy {
    pub fn new(interceptor: Interceptor, origin: Url, max_body: usize) -> Self {
        Self { interceptor, origin, max_body }
    }

    /// Answer one inbound request. Failures become error responses.
    pub async fn serve<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = request.method().clone();
        let uri = request.uri().clone();

        let intercepted = match self.intercepted(request).await {
            Ok(intercepted) => intercepted,
            Err(e) => {
                tracing::info!(%method, %uri, error = %e, "rejected request");
                return Ok(e.into());
            }
        };

        let started = Instant::now();
        let url = intercepted.url.to_string();
        let outcome = self.interceptor.handle(intercepted).await;
        tracing::debug!(
            %method,
            %url,
            class = %outcome.class,
            source = %outcome.source,
            status = outcome.response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );

        Ok(write_response(outcome))
    }

    async fn intercepted<B>(&self, request: Request<B>) -> Result<InterceptedRequest, ProxyError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        if parts.method == Method::CONNECT {
            return Err(ProxyError::BadRequest("CONNECT is not supported".into()));
        }

        let url = target_url(&self.origin, &parts.uri)?;
        let mut intercepted =
            InterceptedRequest::new(parts.method.as_str(), url).with_navigation(is_navigation(&parts.method, &parts.headers));

        for (name, value) in &parts.headers {
            match value.to_str() {
                Ok(value) => intercepted.headers.push((name.as_str().to_string(), value.to_string())),
                Err(_) => tracing::debug!(header = %name, "dropping non-UTF-8 request header"),
            }
        }

        let body = Limited::new(body, self.max_body)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    ProxyError::PayloadTooLarge(self.max_body)
                } else {
                    ProxyError::BadRequest(format!("failed to read request body: {e}"))
                }
            })?
            .to_bytes();
        if !body.is_empty() {
            intercepted = intercepted.with_body(body);
        }

        Ok(intercepted)
    }
}

/// Origin-form targets are resolved against the service origin; absolute-form
/// targets are kept as sent.
fn target_url(origin: &Url, uri: &Uri) -> Result<Url, ProxyError> {
    if uri.scheme().is_some() {
        return canonicalize(&uri.to_string()).map_err(|e| ProxyError::BadRequest(e.to_string()));
    }

    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    resolve(origin, target).map_err(|e| ProxyError::BadRequest(e.to_string()))
}

/// Full-page load: `Sec-Fetch-Mode: navigate`, `Sec-Fetch-Dest: document`,
/// or a GET that accepts HTML.
fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header("sec-fetch-mode").is_some_and(|mode| mode.eq_ignore_ascii_case("navigate"))
        || header("sec-fetch-dest").is_some_and(|dest| dest.eq_ignore_ascii_case("document"))
    {
        return true;
    }

    *method == Method::GET && header(header::ACCEPT.as_str()).is_some_and(|accept| accept.contains("text/html"))
}

fn write_response(outcome: Interception) -> Response<Full<Bytes>> {
    let source = outcome.source;
    let captured = outcome.into_response();

    let mut response = Response::new(Full::new(captured.body));
    *response.status_mut() = StatusCode::from_u16(captured.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for (name, value) in &captured.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "dropping invalid response header"),
        }
    }
    headers.insert(HeaderName::from_static(SOURCE_HEADER), HeaderValue::from_static(source.as_str()));

    response
}
