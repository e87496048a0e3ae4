//! A minimal RPC framework: callers invoke named operations on remote
//! services over length-prefixed binary frames, with live endpoints
//! discovered through a session-based registry.
//!
//! Servers declare services with [`ServiceBuilder`] and serve them with
//! [`RpcServer`]; clients obtain a [`ServiceProxy`] from [`RpcProxy`] and
//! call methods as if they were local. Each call travels on its own
//! connection: one framed [`RpcRequest`] out, one framed [`RpcResponse`]
//! back, then the server closes.

mod codec;
mod dispatcher;
mod error;
mod net;
mod proxy;
mod types;

pub mod registry;

pub use futures::future::BoxFuture;

pub use codec::{FrameDecoder, FrameEncoder, MAX_FRAME};
pub use dispatcher::{HandlerMap, ServiceBuilder, ServiceHandler, ServiceKey};
pub use error::{Error, Result};
pub use net::{
    client::RpcClient,
    server::{RpcServer, ServerHandle, READ_IDLE},
    Fault, FaultKind, RpcRequest, RpcResponse,
};
pub use proxy::{RpcProxy, ServiceProxy};
pub use types::{Params, TypeMismatch, Value, WireType};
