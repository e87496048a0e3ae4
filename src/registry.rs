//! Service registration and discovery.
//!
//! Live endpoints are published under a hierarchical path in an external
//! coordination service, with lifetimes bound to the publishing session.
//! The coordination service itself is abstracted behind the traits in
//! [`coordination`]; [`memory`] ships an in-process implementation.

pub mod coordination;
pub mod memory;

mod client;

pub use client::{CoordinationDiscovery, CoordinationRegistry};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Root node under which every service node lives.
pub const REGISTRY_ROOT: &str = "/registry";

/// Coordination session timeout.
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Coordination connection timeout.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub root: String,
    pub session_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: REGISTRY_ROOT.to_owned(),
            session_timeout: SESSION_TIMEOUT,
            connection_timeout: CONNECTION_TIMEOUT,
        }
    }
}

/// Publishes live service endpoints.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Publish `service_address` (a `host:port` string) as a live endpoint
    /// of `service_name`. The endpoint stays visible for as long as the
    /// publisher's session lives.
    async fn register(&self, service_name: &str, service_address: &str) -> Result<()>;
}

/// Resolves service names to live endpoints.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Resolve `service_name` to one live `host:port` endpoint.
    async fn discovery(&self, service_name: &str) -> Result<String>;
}
