//! The server engine: accept loop, per-connection pipeline, dispatch,
//! graceful shutdown.

use crate::{
    codec::{FrameDecoder, FrameEncoder},
    dispatcher::{dispatch, HandlerMap, ServiceHandler},
    error::Result,
    net::RpcRequest,
    registry::ServiceRegistry,
};
use bytes::BytesMut;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{JoinHandle, JoinSet},
    time::timeout,
};
use tracing::{debug, info, warn};

/// Close a connection that has produced no inbound bytes for this long.
pub const READ_IDLE: Duration = Duration::from_secs(30);

/// Serves registered handlers on a TCP address, publishing each service key
/// to the registry when one is configured.
pub struct RpcServer {
    service_address: String,
    registry: Option<Arc<dyn ServiceRegistry>>,
    handlers: HandlerMap,
    read_idle: Duration,
}

impl RpcServer {
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
            registry: None,
            handlers: HandlerMap::new(),
            read_idle: READ_IDLE,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the inbound idle timeout.
    pub fn read_idle(mut self, read_idle: Duration) -> Self {
        self.read_idle = read_idle;
        self
    }

    /// Add a service implementation. Two handlers under one key is an error.
    pub fn register(&mut self, handler: ServiceHandler) -> Result<()> {
        self.handlers.insert(handler)
    }

    /// Bind, publish every service key under the actual bound address, and
    /// spawn the accept loop.
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.service_address).await?;
        let local_addr = listener.local_addr()?;
        let advertised = local_addr.to_string();

        if let Some(registry) = &self.registry {
            for key in self.handlers.keys() {
                registry.register(key.as_str(), &advertised).await?;
                info!(%key, address = %advertised, "service registered");
            }
        }

        let handlers = Arc::new(self.handlers);
        let read_idle = self.read_idle;
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let handlers = Arc::clone(&handlers);
                            connections.spawn(async move {
                                if let Err(error) =
                                    handle_connection(stream, &handlers, read_idle).await
                                {
                                    warn!(%peer, %error, "connection closed with error");
                                }
                            });
                        }
                        Err(error) => warn!(%error, "accept failed"),
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("accept loop stopped, draining connections");
            while connections.join_next().await.is_some() {}
        });

        info!(address = %local_addr, "rpc server listening");
        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Controls a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, then wait for in-flight connections to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// One connection: read until a full request decodes (bounded by the idle
/// watchdog), dispatch it, write the response, close.
async fn handle_connection(
    mut stream: TcpStream,
    handlers: &HandlerMap,
    read_idle: Duration,
) -> Result<()> {
    let mut decoder = FrameDecoder::<RpcRequest>::new();
    let mut inbound = BytesMut::with_capacity(4096);
    let request = loop {
        if let Some(request) = decoder.decode(&mut inbound)? {
            break request;
        }
        let read = match timeout(read_idle, stream.read_buf(&mut inbound)).await {
            Ok(read) => read?,
            Err(_) => {
                info!("no inbound bytes within idle window, closing connection");
                return Ok(());
            }
        };
        if read == 0 {
            // peer went away without completing a request
            return Ok(());
        }
    };

    debug!(
        request_id = %request.request_id,
        interface = %request.interface_name,
        method = %request.method_name,
        "request received"
    );
    let response = dispatch(handlers, request).await;

    let mut outbound = BytesMut::new();
    FrameEncoder::new().encode(&response, &mut outbound)?;
    stream.write_all(&outbound).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}
