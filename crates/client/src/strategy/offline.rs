//! Synthetic responses returned when neither the origin nor the store can answer.

use precache_core::CachedResponse;
use serde::{Deserialize, Serialize};

/// Status used for every synthetic failure.
pub const SERVICE_UNAVAILABLE: u16 = 503;

const OFFLINE_MESSAGE: &str = "The network is unreachable and no cached data is available for this request.";

/// Body of the API offline response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflinePayload {
    pub error: String,
    pub message: String,
}

impl Default for OfflinePayload {
    fn default() -> Self {
        Self { error: "offline".into(), message: OFFLINE_MESSAGE.into() }
    }
}

/// Machine-readable offline response for API requests with nothing cached.
pub fn offline_api() -> CachedResponse {
    let body = serde_json::to_vec(&OfflinePayload::default()).unwrap_or_default();
    CachedResponse::new(SERVICE_UNAVAILABLE, body)
        .with_header("content-type", "application/json")
        .with_header("cache-control", "no-store")
}

/// Minimal response for static assets that cannot be served.
pub fn unavailable() -> CachedResponse {
    CachedResponse::new(SERVICE_UNAVAILABLE, "Service Unavailable")
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_header("cache-control", "no-store")
}
