//! Request classification.
//!
//! Rules, first match wins:
//! 1. Different origin, or a method other than GET/HEAD: `Unhandled`
//! 2. Path under a live prefix: `LiveApi`
//! 3. Navigation intent: `Navigation`
//! 4. Path listed in the precache manifest: `Precached`
//! 5. Everything else: `Static`
//!
//! Cross-origin responses are never cached, and API traffic under a live
//! prefix is never served from the asset cache ahead of the network.

use std::collections::HashSet;
use std::fmt;

use precache_core::InterceptedRequest;
use url::{Origin, Url};

/// How a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Passed straight to the network, never cached.
    Unhandled,
    /// A manifest asset.
    Precached,
    /// A full-page load.
    Navigation,
    /// Live API data.
    LiveApi,
    /// Any other same-origin read.
    Static,
}

/// Retrieval algorithm for a route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

impl RouteClass {
    /// Strategy for the class, `None` when the cache is bypassed.
    pub fn strategy(self) -> Option<Strategy> {
        match self {
            RouteClass::Unhandled => None,
            RouteClass::LiveApi => Some(Strategy::NetworkFirst),
            RouteClass::Precached | RouteClass::Navigation | RouteClass::Static => Some(Strategy::CacheFirst),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Unhandled => "unhandled",
            RouteClass::Precached => "precached",
            RouteClass::Navigation => "navigation",
            RouteClass::LiveApi => "live_api",
            RouteClass::Static => "static",
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static routing table for one service origin.
#[derive(Debug, Clone)]
pub struct RouteTable {
    origin: Origin,
    live_prefixes: Vec<String>,
    precached: HashSet<String>,
}

impl RouteTable {
    pub fn new<P, M>(origin: &Url, live_prefixes: P, manifest: M) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            origin: origin.origin(),
            live_prefixes: live_prefixes.into_iter().map(Into::into).collect(),
            precached: manifest.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `url` belongs to the service's own origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    pub fn is_live(&self, path: &str) -> bool {
        self.live_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn classify(&self, request: &InterceptedRequest) -> RouteClass {
        if !self.is_same_origin(&request.url) || !request.is_safe_read() {
            return RouteClass::Unhandled;
        }

        let path = request.url.path();
        if self.is_live(path) {
            RouteClass::LiveApi
        } else if request.navigation {
            RouteClass::Navigation
        } else if self.precached.contains(path) {
            RouteClass::Precached
        } else {
            RouteClass::Static
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let origin = Url::parse("https://app.example.com").unwrap();
        RouteTable::new(&origin, ["/api/", "/graphql"], ["/", "/index.html", "/app.js"])
    }

    fn get(url: &str) -> InterceptedRequest {
        InterceptedRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_cross_origin_is_unhandled() {
        let table = table();
        assert_eq!(table.classify(&get("https://cdn.example.net/api/health")), RouteClass::Unhandled);
        assert_eq!(table.classify(&get("http://app.example.com/app.js")), RouteClass::Unhandled);
        assert_eq!(table.classify(&get("https://app.example.com:8443/app.js")), RouteClass::Unhandled);
    }

    #[test]
    fn test_cross_origin_checked_before_navigation() {
        let request = get("https://other.example.org/").with_navigation(true);
        assert_eq!(table().classify(&request), RouteClass::Unhandled);
    }

    #[test]
    fn test_unsafe_method_is_unhandled() {
        let request = InterceptedRequest::new("POST", Url::parse("https://app.example.com/api/items").unwrap());
        assert_eq!(table().classify(&request), RouteClass::Unhandled);
    }

    #[test]
    fn test_live_prefix() {
        let table = table();
        assert_eq!(table.classify(&get("https://app.example.com/api/health")), RouteClass::LiveApi);
        assert_eq!(table.classify(&get("https://app.example.com/graphql?q=1")), RouteClass::LiveApi);
        let head = InterceptedRequest::new("HEAD", Url::parse("https://app.example.com/api/health").unwrap());
        assert_eq!(table.classify(&head), RouteClass::LiveApi);
    }

    #[test]
    fn test_live_takes_precedence_over_navigation() {
        let request = get("https://app.example.com/api/report").with_navigation(true);
        assert_eq!(table().classify(&request), RouteClass::LiveApi);
    }

    #[test]
    fn test_navigation() {
        let request = get("https://app.example.com/dashboard").with_navigation(true);
        assert_eq!(table().classify(&request), RouteClass::Navigation);

        let root = get("https://app.example.com/").with_navigation(true);
        assert_eq!(table().classify(&root), RouteClass::Navigation);
    }

    #[test]
    fn test_precached_and_static() {
        let table = table();
        assert_eq!(table.classify(&get("https://app.example.com/app.js")), RouteClass::Precached);
        assert_eq!(table.classify(&get("https://app.example.com/fonts/Regular.woff2")), RouteClass::Static);
    }

    #[test]
    fn test_strategies() {
        assert_eq!(RouteClass::LiveApi.strategy(), Some(Strategy::NetworkFirst));
        assert_eq!(RouteClass::Navigation.strategy(), Some(Strategy::CacheFirst));
        assert_eq!(RouteClass::Static.strategy(), Some(Strategy::CacheFirst));
        assert_eq!(RouteClass::Precached.strategy(), Some(Strategy::CacheFirst));
        assert_eq!(RouteClass::Unhandled.strategy(), None);
    }
}
