//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PRECACHE_*)
//! 2. TOML config file (if PRECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PRECACHE_*)
/// 2. TOML config file (if PRECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
///
/// List values given through the environment use figment's array syntax,
/// e.g. `PRECACHE_LIVE_PREFIXES='["/api/", "/graphql"]'`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache generation identifier, bumped on every deploy.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// The service's own public origin. Requests to any other origin bypass the cache.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Where same-origin traffic is forwarded.
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Socket address the proxy listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path to SQLite cache database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Default User-Agent of the origin client.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body bytes accepted from the origin.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Origin request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirects followed per origin request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Absolute paths fetched and stored during install.
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Path prefixes served network-first.
    #[serde(default = "default_live_prefixes")]
    pub live_prefixes: Vec<String>,

    /// Precached document served to navigations when offline.
    #[serde(default = "default_root_document")]
    pub root_document: String,

    /// Activate a freshly installed generation without waiting for
    /// requests pinned to the previous one to finish.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,
}

fn default_generation() -> String {
    "v1".into()
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_upstream() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./precache.sqlite")
}

fn default_user_agent() -> String {
    "precache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_precache_manifest() -> Vec<String> {
    vec!["/".into(), "/index.html".into()]
}

fn default_live_prefixes() -> Vec<String> {
    vec!["/api/".into()]
}

fn default_root_document() -> String {
    "/index.html".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            origin: default_origin(),
            upstream: default_upstream(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            precache_manifest: default_precache_manifest(),
            live_prefixes: default_live_prefixes(),
            root_document: default_root_document(),
            skip_waiting: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed `origin`.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("origin", &self.origin)
    }

    /// Parsed `upstream`.
    pub fn upstream_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("upstream", &self.upstream)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed,
    /// or validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PRECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PRECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate a config from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid { field: field.into(), reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid { field: field.into(), reason: format!("unsupported scheme: {other}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.generation, "v1");
        assert_eq!(config.db_path, PathBuf::from("./precache.sqlite"));
        assert_eq!(config.user_agent, "precache/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.precache_manifest, vec!["/", "/index.html"]);
        assert_eq!(config.live_prefixes, vec!["/api/"]);
        assert_eq!(config.root_document, "/index.html");
        assert!(config.skip_waiting);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_origin_url() {
        let config = AppConfig { origin: "https://App.Example.com".into(), ..Default::default() };
        assert_eq!(config.origin_url().unwrap().host_str(), Some("app.example.com"));
    }

    #[test]
    fn test_origin_url_rejects_scheme() {
        let config = AppConfig { origin: "ftp://example.com".into(), ..Default::default() };
        assert!(matches!(config.origin_url(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_from_figment_toml_layer() {
        let toml = r#"
            generation = "2024.06.1"
            live_prefixes = ["/api/", "/graphql"]
            skip_waiting = false
        "#;
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));

        let config = AppConfig::from_figment(figment).unwrap();
        assert_eq!(config.generation, "2024.06.1");
        assert_eq!(config.live_prefixes, vec!["/api/", "/graphql"]);
        assert!(!config.skip_waiting);
        assert_eq!(config.root_document, "/index.html");
    }

    #[test]
    fn test_from_figment_rejects_invalid() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(r#"generation = """#));
        assert!(matches!(AppConfig::from_figment(figment), Err(ConfigError::Invalid { .. })));
    }
}
