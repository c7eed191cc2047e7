//! Structured errors for the precache proxy.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode, header};

/// Inbound requests the proxy refuses before interception.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Request target could not be turned into an absolute http(s) URL.
    #[error("BAD_REQUEST: {0}")]
    BadRequest(String),

    /// Request body exceeded the configured limit.
    #[error("PAYLOAD_TOO_LARGE: request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<ProxyError> for Response<Full<Bytes>> {
    fn from(err: ProxyError) -> Self {
        let mut response = Response::new(Full::new(Bytes::from(err.to_string())));
        *response.status_mut() = err.status();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }
}
