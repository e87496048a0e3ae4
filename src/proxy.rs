//! Client-side proxy: turns typed method invocations into [`RpcRequest`]s,
//! resolves an endpoint, and maps the response back to a typed result or a
//! raised error.

use crate::{
    dispatcher::ServiceKey,
    error::{Error, Result},
    net::{client::RpcClient, FaultKind, RpcRequest, RpcResponse},
    registry::ServiceDiscovery,
    types::{Params, Value, WireType},
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

/// Factory for [`ServiceProxy`]s. Endpoints come from a discovery component
/// when one is configured, otherwise from an administratively set address.
pub struct RpcProxy {
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    service_address: Option<String>,
}

impl RpcProxy {
    pub fn with_discovery(discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self {
            discovery: Some(discovery),
            service_address: None,
        }
    }

    pub fn with_address(service_address: impl Into<String>) -> Self {
        Self {
            discovery: None,
            service_address: Some(service_address.into()),
        }
    }

    /// A proxy for one `(interface, version)` pair.
    pub fn create(&self, interface_name: &str, service_version: &str) -> ServiceProxy {
        ServiceProxy {
            interface_name: interface_name.to_owned(),
            service_version: service_version.to_owned(),
            discovery: self.discovery.clone(),
            service_address: self.service_address.clone(),
            call_timeout: None,
        }
    }
}

/// Stands in for one remote service interface. Every call opens a fresh
/// connection, so concurrent calls are independent.
pub struct ServiceProxy {
    interface_name: String,
    service_version: String,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    service_address: Option<String>,
    call_timeout: Option<Duration>,
}

impl ServiceProxy {
    /// Bound discovery, connect, and the wait for the response with one
    /// deadline. Calls wait indefinitely by default.
    pub fn call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    /// Invoke `method_name` remotely. A fault carried in the response is
    /// re-raised here, so remote errors read like local ones.
    pub async fn call<A, R>(&self, method_name: &str, arguments: A) -> Result<R>
    where
        A: Params,
        R: WireType,
    {
        let request = RpcRequest {
            request_id: Uuid::new_v4().to_string(),
            interface_name: self.interface_name.clone(),
            service_version: self.service_version.clone(),
            method_name: method_name.to_owned(),
            parameter_types: A::type_ids(),
            parameters: arguments.into_values(),
        };

        let exchange = self.exchange(request);
        let response = match self.call_timeout {
            Some(limit) => timeout(limit, exchange).await.map_err(|_| {
                Error::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "call deadline exceeded",
                ))
            })??,
            None => exchange.await?,
        };

        if let Some(fault) = response.exception {
            return Err(match fault.kind {
                FaultKind::NoSuchService => Error::NoSuchService(fault.message),
                _ => Error::Remote(fault),
            });
        }
        let result = response.result.unwrap_or(Value::Null);
        Ok(R::from_value(result)?)
    }

    async fn exchange(&self, request: RpcRequest) -> Result<RpcResponse> {
        let service_address = self.resolve_address().await?;
        debug!(
            request_id = %request.request_id,
            address = %service_address,
            method = %request.method_name,
            "sending request"
        );
        RpcClient::new(service_address).send(request).await
    }

    async fn resolve_address(&self) -> Result<String> {
        if let Some(discovery) = &self.discovery {
            let key = ServiceKey::new(&self.interface_name, &self.service_version);
            let service_address = discovery.discovery(key.as_str()).await?;
            info!(%key, address = %service_address, "discovered service");
            let service_address = service_address.trim();
            if service_address.is_empty() {
                return Err(Error::Address(format!(
                    "registry returned an empty address for {key}"
                )));
            }
            return Ok(service_address.to_owned());
        }
        match &self.service_address {
            Some(service_address) if !service_address.trim().is_empty() => {
                Ok(service_address.trim().to_owned())
            }
            _ => Err(Error::Address(
                "neither a discovery component nor a service address is configured".to_owned(),
            )),
        }
    }
}
