//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::net::SocketAddr;

use crate::config::AppConfig;
use crate::request::resolve;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.trim().is_empty() {
            return Err(invalid("generation", "must not be empty"));
        }

        let origin = self.origin_url()?;
        if origin.path() != "/" || origin.query().is_some() {
            return Err(invalid("origin", "must be a bare origin without path or query"));
        }
        self.upstream_url()?;

        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| invalid("listen_addr", e.to_string()))?;

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        for path in &self.precache_manifest {
            resolve(&origin, path).map_err(|e| invalid("precache_manifest", e.to_string()))?;
        }
        if let Some(prefix) = self.live_prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("live_prefixes", format!("{prefix:?} must start with '/'")));
        }
        if !self.precache_manifest.contains(&self.root_document) {
            return Err(invalid("root_document", format!("{} is not in precache_manifest", self.root_document)));
        }

        if let Some(path) = self
            .precache_manifest
            .iter()
            .find(|p| self.live_prefixes.iter().any(|prefix| p.starts_with(prefix.as_str())))
        {
            tracing::warn!(path = %path, "precached path is under a live prefix and will be served network-first");
        }

        Ok(())
    }
}
