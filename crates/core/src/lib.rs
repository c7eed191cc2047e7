//! Core types and shared functionality for precache.
//!
//! This crate provides:
//! - The versioned response store with SQLite backend
//! - Request and response capture types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod request;

pub use cache::{CacheDb, CacheEntry, GenerationHandle, VersionStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use request::{CachedResponse, InterceptedRequest, RequestKey};
