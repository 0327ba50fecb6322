use async_trait::async_trait;
use chordring_lib::protocol::{Request, Response};
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::TransportError;

/// One request, one response, one connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkClient: Send + Sync + 'static {
    async fn call_node(
        &self,
        address: SocketAddr,
        request: Request,
    ) -> Result<Response, TransportError>;
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Talks to peers over TCP with the newline-terminated text protocol.
#[derive(Debug, Clone)]
pub struct RealNetworkClient {
    timeout: Duration,
}

impl Default for RealNetworkClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl RealNetworkClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(
        &self,
        address: SocketAddr,
        request: Request,
    ) -> Result<Response, TransportError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| TransportError::Connect { address, source })?;
        let (read_half, mut write_half) = stream.into_split();

        debug!("Sending {} to {}", request, address);
        write_half
            .write_all(format!("{}\n", request).as_bytes())
            .await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(TransportError::NoResponse(address));
        }

        let response = line.parse::<Response>()?;
        debug!("Received {} from {}", response, address);
        Ok(response)
    }
}

#[async_trait]
impl NetworkClient for RealNetworkClient {
    async fn call_node(
        &self,
        address: SocketAddr,
        request: Request,
    ) -> Result<Response, TransportError> {
        match timeout(self.timeout, self.exchange(address, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                address,
                timeout: self.timeout,
            }),
        }
    }
}

/// Sends a request and folds every failure, including an answer that does
/// not fit the request, into "no answer".
pub async fn send<T: NetworkClient + ?Sized>(
    client: &T,
    address: SocketAddr,
    request: Request,
) -> Option<Response> {
    match client.call_node(address, request).await {
        Ok(response) if request.accepts(&response) => Some(response),
        Ok(response) => {
            debug!("{} to {} got mismatched answer {}", request, address, response);
            None
        }
        Err(e) => {
            debug!("{} to {} got no answer: {}", request, address, e);
            None
        }
    }
}

/// Sends a request expecting an address back.
///
/// `NOTHING` means the peer stands for itself and yields the peer's own
/// address. No answer, or an answer meant for another request, yields `None`.
pub async fn request_address<T: NetworkClient + ?Sized>(
    client: &T,
    address: SocketAddr,
    request: Request,
) -> Option<SocketAddr> {
    match send(client, address, request).await? {
        Response::Nothing => Some(address),
        response => response.address(),
    }
}

/// `KEEP` probe, alive only on `ALIVE`.
pub async fn is_alive<T: NetworkClient + ?Sized>(client: &T, address: SocketAddr) -> bool {
    matches!(send(client, address, Request::Keep).await, Some(Response::Alive))
}
