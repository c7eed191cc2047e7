//! Request interception for precache.
//!
//! This crate provides the origin client, route classification, the
//! cache-first and network-first strategies, and the generation lifecycle
//! shared by the proxy server.

pub mod fetch;
pub mod lifecycle;
pub mod route;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Origin};
pub use lifecycle::{ActivationReport, ActiveGeneration, GenerationLease, LifecycleController, LifecycleState};
pub use route::{RouteClass, RouteTable, Strategy};
pub use strategy::{Interception, Interceptor, ResponseSource};
