//! SQLite-backed version store for intercepted responses.
//!
//! Entries are grouped into named generations. Exactly one generation is
//! active at a time; older ones are garbage collected on activation.
//!
//! - Request keys are SHA-256 digests of method and normalized URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Entries cascade-delete with their generation

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod store;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use store::{GenerationHandle, VersionStore};
