//! Connection-level client: one fresh connection, one request, one response.

use crate::{
    codec::{FrameDecoder, FrameEncoder},
    error::{Error, Result},
    net::{RpcRequest, RpcResponse},
};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpSocket, TcpStream},
};
use tracing::debug;

/// Sends a single request to a fixed `host:port` and waits for its response.
pub struct RpcClient {
    service_address: String,
}

impl RpcClient {
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
        }
    }

    /// Connect, write the framed request, then read until the response
    /// decodes. The server closes the connection after responding; a close
    /// before any response is a transport error.
    pub async fn send(&self, request: RpcRequest) -> Result<RpcResponse> {
        let mut stream = self.connect().await?;

        let mut outbound = BytesMut::new();
        FrameEncoder::new().encode(&request, &mut outbound)?;
        stream.write_all(&outbound).await?;
        stream.flush().await?;

        let mut decoder = FrameDecoder::<RpcResponse>::new();
        let mut inbound = BytesMut::with_capacity(4096);
        loop {
            if let Some(response) = decoder.decode(&mut inbound)? {
                if response.request_id != request.request_id {
                    return Err(Error::Protocol(format!(
                        "response correlates to request {}, expected {}",
                        response.request_id, request.request_id
                    )));
                }
                debug!(request_id = %response.request_id, "response received");
                return Ok(response);
            }
            let read = stream.read_buf(&mut inbound).await?;
            if read == 0 {
                return Err(Error::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before a response arrived",
                )));
            }
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let address = resolve(&self.service_address).await?;
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_keepalive(true)?;
        let stream = socket.connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

async fn resolve(service_address: &str) -> Result<SocketAddr> {
    lookup_host(service_address)
        .await?
        .next()
        .ok_or_else(|| Error::Address(format!("{service_address} did not resolve")))
}
