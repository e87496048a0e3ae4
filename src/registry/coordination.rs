//! Capability surface of the external coordination service.
//!
//! The registry and discovery clients are written against these traits
//! only; any hierarchical, session-based store with ephemeral-sequential
//! nodes can stand behind them.

use crate::{error::Result, registry::RegistryConfig};
use async_trait::async_trait;

/// A coordination service endpoint sessions can be opened against.
#[async_trait]
pub trait Coordination: Send + Sync {
    /// Open a session honoring the config's session and connection
    /// timeouts.
    async fn connect(&self, config: &RegistryConfig) -> Result<Box<dyn CoordinationSession>>;
}

/// One live session.
///
/// Ephemeral nodes created through a session disappear when the session
/// ends: immediately on a clean [`close`](CoordinationSession::close), or
/// once the session timeout expires when the owner dies silently.
#[async_trait]
pub trait CoordinationSession: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create a persistent node. Persistent nodes outlive every session;
    /// creating one that already exists is a no-op.
    async fn create_persistent(&self, path: &str) -> Result<()>;

    /// Create an ephemeral child named `prefix` plus a monotonically
    /// increasing, zero-padded sequence number. Returns the full path of
    /// the node actually created.
    async fn create_ephemeral_sequential(&self, prefix: &str, payload: &[u8]) -> Result<String>;

    /// Names of the direct children of `path`.
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    async fn read_data(&self, path: &str) -> Result<Vec<u8>>;

    /// End the session cleanly, removing its ephemeral nodes at once.
    async fn close(&self) -> Result<()>;
}
