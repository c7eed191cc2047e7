//! URL canonicalization for consistent request keys.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string so equal resources produce equal request keys.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    normalize(parsed)
}

/// Resolve an absolute path (e.g. a manifest entry) against an origin.
pub fn resolve(origin: &Url, path: &str) -> Result<Url, UrlError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(UrlError::Empty);
    }
    if !path.starts_with('/') {
        return Err(UrlError::InvalidUrl(format!("expected an absolute path, got {path:?}")));
    }

    let joined = origin.join(path).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    if joined.origin() != origin.origin() {
        return Err(UrlError::InvalidUrl(format!("{path:?} resolves outside {origin}")));
    }
    normalize(joined)
}

fn normalize(mut parsed: Url) -> Result<Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
