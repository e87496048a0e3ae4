//! Registration and discovery over the coordination capability surface.

use super::{
    coordination::{Coordination, CoordinationSession},
    RegistryConfig, ServiceDiscovery, ServiceRegistry,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes service endpoints.
///
/// Holds one session open for as long as the handle lives; every endpoint
/// published through it stays registered until the handle is closed or its
/// owner dies.
pub struct CoordinationRegistry {
    session: Box<dyn CoordinationSession>,
    root: String,
}

impl CoordinationRegistry {
    pub async fn connect(coordination: &dyn Coordination, config: &RegistryConfig) -> Result<Self> {
        let session = coordination.connect(config).await?;
        info!(root = %config.root, "registry session opened");
        Ok(Self {
            session,
            root: config.root.clone(),
        })
    }

    /// End the session, withdrawing every endpoint it published.
    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }
}

#[async_trait]
impl ServiceRegistry for CoordinationRegistry {
    async fn register(&self, service_name: &str, service_address: &str) -> Result<()> {
        if !self.session.exists(&self.root).await? {
            self.session.create_persistent(&self.root).await?;
            debug!(path = %self.root, "created registry root");
        }
        let service_path = format!("{}/{service_name}", self.root);
        if !self.session.exists(&service_path).await? {
            self.session.create_persistent(&service_path).await?;
            debug!(path = %service_path, "created service node");
        }
        let address_prefix = format!("{service_path}/address-");
        let address_node = self
            .session
            .create_ephemeral_sequential(&address_prefix, service_address.as_bytes())
            .await?;
        info!(node = %address_node, address = %service_address, "endpoint registered");
        Ok(())
    }
}

/// Resolves a service key to one live endpoint, choosing uniformly at
/// random when several are registered. Opens a short-lived session per
/// lookup.
pub struct CoordinationDiscovery {
    coordination: Arc<dyn Coordination>,
    config: RegistryConfig,
}

impl CoordinationDiscovery {
    pub fn new(coordination: Arc<dyn Coordination>, config: RegistryConfig) -> Self {
        Self {
            coordination,
            config,
        }
    }

    async fn lookup(&self, session: &dyn CoordinationSession, service_name: &str) -> Result<String> {
        let service_path = format!("{}/{service_name}", self.config.root);
        if !session.exists(&service_path).await? {
            return Err(Error::NoSuchService(service_name.to_owned()));
        }
        let children = session.get_children(&service_path).await?;
        if children.is_empty() {
            return Err(Error::NoProviders(service_name.to_owned()));
        }
        let chosen = if children.len() == 1 {
            &children[0]
        } else {
            &children[rand::thread_rng().gen_range(0..children.len())]
        };
        debug!(service = service_name, node = %chosen, of = children.len(), "chose endpoint");
        let payload = session.read_data(&format!("{service_path}/{chosen}")).await?;
        String::from_utf8(payload)
            .map_err(|_| Error::Protocol("endpoint payload is not valid utf-8".to_owned()))
    }
}

#[async_trait]
impl ServiceDiscovery for CoordinationDiscovery {
    async fn discovery(&self, service_name: &str) -> Result<String> {
        let session = self.coordination.connect(&self.config).await?;
        let outcome = self.lookup(session.as_ref(), service_name).await;
        let _ = session.close().await;
        if let Ok(address) = &outcome {
            info!(service = service_name, address = %address, "service discovered");
        }
        outcome
    }
}
