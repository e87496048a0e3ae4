pub mod client;
pub mod server;

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One remote invocation, client to server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Globally unique per call. Echoed by the response.
    pub request_id: String,
    pub interface_name: String,
    /// Version label, possibly empty.
    pub service_version: String,
    pub method_name: String,
    /// Declared type identifier of each argument, in order.
    pub parameter_types: Vec<String>,
    pub parameters: Vec<Value>,
}

/// The outcome of one invocation, server to client. At most one of
/// `result` / `exception` is populated; both absent means a null result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub request_id: String,
    pub result: Option<Value>,
    pub exception: Option<Fault>,
}

impl RpcResponse {
    pub fn success(request_id: String, result: Value) -> Self {
        let result = match result {
            Value::Null => None,
            other => Some(other),
        };
        Self {
            request_id,
            result,
            exception: None,
        }
    }

    pub fn failure(request_id: String, fault: Fault) -> Self {
        Self {
            request_id,
            result: None,
            exception: Some(fault),
        }
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }
}

/// Structured error carried in a response and re-raised at the call site.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn no_such_service(key: impl fmt::Display) -> Self {
        Self {
            kind: FaultKind::NoSuchService,
            message: format!("no handler registered for key {key}"),
        }
    }

    pub fn no_such_method(interface_name: &str, method_name: &str) -> Self {
        Self {
            kind: FaultKind::NoSuchMethod,
            message: format!("{interface_name} has no method {method_name}"),
        }
    }

    pub fn bad_parameters(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::BadParameters,
            message: message.into(),
        }
    }

    /// An error raised by the handler implementation itself.
    pub fn handler(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Handler,
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    NoSuchService,
    NoSuchMethod,
    BadParameters,
    Handler,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FaultKind::NoSuchService => "no such service",
            FaultKind::NoSuchMethod => "no such method",
            FaultKind::BadParameters => "bad parameters",
            FaultKind::Handler => "handler error",
        };
        f.write_str(name)
    }
}
