use crate::{net::Fault, types::TypeMismatch};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed frame or undecodable record. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connect, read or write failure, including idle-timeout closes
    /// observed from the peer side.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No service node in the registry, or no handler entry on the server,
    /// for the requested key.
    #[error("no service found for key {0}")]
    NoSuchService(String),

    /// The service node exists but has zero live endpoint children.
    #[error("no providers available for key {0}")]
    NoProviders(String),

    /// The coordination service is unavailable or rejected an operation.
    #[error("registry session error: {0}")]
    RegistrySession(String),

    /// Missing, empty, or unresolvable service address.
    #[error("invalid service address: {0}")]
    Address(String),

    /// Two handlers registered under one key at startup.
    #[error("duplicate service registration for key {0}")]
    DuplicateService(String),

    /// A fault raised by the remote handler, re-raised at the call site.
    #[error("remote call failed: {0}")]
    Remote(Fault),

    #[error(transparent)]
    Type(#[from] TypeMismatch),
}
