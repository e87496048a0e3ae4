//! Server-side handler registry and request dispatch.
//!
//! Services are declared explicitly through [`ServiceBuilder`]; each method
//! is type-erased once at registration into an invoker that carries its
//! declared parameter types, so a call is two map lookups away from running
//! handler code.

use crate::{
    error::{Error, Result},
    net::{Fault, RpcRequest, RpcResponse},
    types::{Params, Value, WireType},
};
use futures::future::BoxFuture;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    future::Future,
    sync::Arc,
};
use tracing::warn;

/// The `(interface name, version)` pair rendered as the single lookup token
/// used for both handler dispatch and registry paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// `interface_name` alone when the trimmed version is empty, otherwise
    /// `interface_name + "-" + trimmed version`.
    pub fn new(interface_name: &str, service_version: &str) -> Self {
        let version = service_version.trim();
        if version.is_empty() {
            Self(interface_name.to_owned())
        } else {
            Self(format!("{interface_name}-{version}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type CallResult = std::result::Result<Value, Fault>;

type Invoker = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, CallResult> + Send + Sync>;

struct MethodEntry {
    parameter_types: Vec<String>,
    invoke: Invoker,
}

/// Declares one service implementation: an interface name, a version label,
/// and the methods dispatched under them.
pub struct ServiceBuilder {
    interface_name: String,
    service_version: String,
    methods: BTreeMap<String, MethodEntry>,
}

impl ServiceBuilder {
    pub fn new(interface_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            service_version: service_version.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Register an infallible method.
    pub fn method<A, R, F, Fut>(self, name: &str, function: F) -> Self
    where
        A: Params + Send + 'static,
        R: WireType + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.try_method(name, move |arguments: A| {
            let returned = function(arguments);
            async move { Ok(returned.await) }
        })
    }

    /// Register a method that may raise a [`Fault`] of its own.
    pub fn try_method<A, R, F, Fut>(mut self, name: &str, function: F) -> Self
    where
        A: Params + Send + 'static,
        R: WireType + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, Fault>> + Send + 'static,
    {
        let parameter_types = A::type_ids();
        let function = Arc::new(function);
        let invoke: Invoker = Box::new(move |values| {
            let function = Arc::clone(&function);
            Box::pin(async move {
                let arguments =
                    A::from_values(values).map_err(|e| Fault::bad_parameters(e.to_string()))?;
                let returned = function(arguments).await?;
                Ok(returned.into_value())
            })
        });
        self.methods.insert(
            name.to_owned(),
            MethodEntry {
                parameter_types,
                invoke,
            },
        );
        self
    }

    pub fn build(self) -> ServiceHandler {
        ServiceHandler {
            key: ServiceKey::new(&self.interface_name, &self.service_version),
            interface_name: self.interface_name,
            methods: self.methods,
        }
    }
}

/// A built service implementation, dispatched to by its [`ServiceKey`].
pub struct ServiceHandler {
    key: ServiceKey,
    interface_name: String,
    methods: BTreeMap<String, MethodEntry>,
}

impl ServiceHandler {
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    async fn invoke(
        &self,
        method_name: &str,
        parameter_types: &[String],
        parameters: Vec<Value>,
    ) -> CallResult {
        let Some(method) = self.methods.get(method_name) else {
            return Err(Fault::no_such_method(&self.interface_name, method_name));
        };
        if method.parameter_types != parameter_types {
            return Err(Fault::bad_parameters(format!(
                "method {method_name} declares parameter types {:?}, request carries {:?}",
                method.parameter_types, parameter_types
            )));
        }
        (method.invoke)(parameters).await
    }
}

/// Maps [`ServiceKey`]s to handlers. Populated at startup, read-only while
/// the server runs.
#[derive(Default)]
pub struct HandlerMap {
    handlers: HashMap<ServiceKey, ServiceHandler>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under its key. A second handler for the same key is
    /// a startup error.
    pub fn insert(&mut self, handler: ServiceHandler) -> Result<()> {
        let key = handler.key().clone();
        if self.handlers.contains_key(&key) {
            return Err(Error::DuplicateService(key.to_string()));
        }
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.handlers.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn get(&self, key: &ServiceKey) -> Option<&ServiceHandler> {
        self.handlers.get(key)
    }
}

/// Run one decoded request against the handler map, producing the response
/// to write back. Handler faults land in `exception`; the request id is
/// always echoed.
pub(crate) async fn dispatch(handlers: &HandlerMap, request: RpcRequest) -> RpcResponse {
    let key = ServiceKey::new(&request.interface_name, &request.service_version);
    let Some(handler) = handlers.get(&key) else {
        warn!(%key, "no handler registered for requested key");
        return RpcResponse::failure(request.request_id, Fault::no_such_service(&key));
    };
    match handler
        .invoke(
            &request.method_name,
            &request.parameter_types,
            request.parameters,
        )
        .await
    {
        Ok(value) => RpcResponse::success(request.request_id, value),
        Err(fault) => {
            warn!(%key, method = %request.method_name, %fault, "handler returned fault");
            RpcResponse::failure(request.request_id, fault)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::FaultKind;

    fn adder() -> ServiceHandler {
        ServiceBuilder::new("MathService", "v1.0")
            .method("add", |(a, b): (i64, i64)| async move { a + b })
            .try_method("checked_div", |(a, b): (i64, i64)| async move {
                if b == 0 {
                    Err(Fault::handler("division by zero"))
                } else {
                    Ok(a / b)
                }
            })
            .build()
    }

    fn request(interface: &str, version: &str, method: &str, args: (i64, i64)) -> RpcRequest {
        RpcRequest {
            request_id: "req-7".into(),
            interface_name: interface.into(),
            service_version: version.into(),
            method_name: method.into(),
            parameter_types: <(i64, i64)>::type_ids(),
            parameters: vec![Value::Int(args.0), Value::Int(args.1)],
        }
    }

    #[test]
    fn key_derivation() {
        assert_eq!(ServiceKey::new("HelloService", "").as_str(), "HelloService");
        assert_eq!(
            ServiceKey::new("HelloService", " v1 ").as_str(),
            "HelloService-v1"
        );
        assert_eq!(
            ServiceKey::new("HelloService", "   ").as_str(),
            "HelloService"
        );
    }

    #[tokio::test]
    async fn dispatch_invokes_the_right_method_and_echoes_the_id() {
        let mut handlers = HandlerMap::new();
        handlers.insert(adder()).unwrap();

        let response = dispatch(&handlers, request("MathService", "v1.0", "add", (40, 2))).await;
        assert_eq!(response.request_id, "req-7");
        assert_eq!(response.result, Some(Value::Int(42)));
        assert!(!response.has_exception());
    }

    #[tokio::test]
    async fn dispatch_unknown_key_yields_no_such_service() {
        let handlers = HandlerMap::new();
        let response = dispatch(&handlers, request("MathService", "v9.9", "add", (1, 1))).await;
        assert_eq!(response.request_id, "req-7");
        let fault = response.exception.unwrap();
        assert_eq!(fault.kind, FaultKind::NoSuchService);
        assert!(fault.message.contains("MathService-v9.9"));
    }

    #[tokio::test]
    async fn dispatch_unknown_method_yields_no_such_method() {
        let mut handlers = HandlerMap::new();
        handlers.insert(adder()).unwrap();
        let response = dispatch(&handlers, request("MathService", "v1.0", "mul", (2, 3))).await;
        let fault = response.exception.unwrap();
        assert_eq!(fault.kind, FaultKind::NoSuchMethod);
    }

    #[tokio::test]
    async fn dispatch_checks_declared_parameter_types() {
        let mut handlers = HandlerMap::new();
        handlers.insert(adder()).unwrap();
        let mut req = request("MathService", "v1.0", "add", (1, 2));
        req.parameter_types = vec!["string".into(), "int".into()];
        let response = dispatch(&handlers, req).await;
        assert_eq!(response.exception.unwrap().kind, FaultKind::BadParameters);
    }

    #[tokio::test]
    async fn handler_fault_is_captured_not_propagated() {
        let mut handlers = HandlerMap::new();
        handlers.insert(adder()).unwrap();
        let response = dispatch(
            &handlers,
            request("MathService", "v1.0", "checked_div", (1, 0)),
        )
        .await;
        let fault = response.exception.unwrap();
        assert_eq!(fault.kind, FaultKind::Handler);
        assert!(fault.message.contains("division by zero"));
    }

    #[test]
    fn duplicate_key_is_a_startup_error() {
        let mut handlers = HandlerMap::new();
        handlers.insert(adder()).unwrap();
        let err = handlers.insert(adder()).unwrap_err();
        assert!(matches!(err, Error::DuplicateService(key) if key == "MathService-v1.0"));
    }
}
