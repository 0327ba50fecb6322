//! Inbound request server: one request line in, at most one response line out.

use chordring_lib::protocol::Request;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::network_client::NetworkClient;
use crate::node::ChordNode;

pub struct RequestServer<T: NetworkClient> {
    node: ChordNode<T>,
    listener: TcpListener,
    workers: Arc<Semaphore>,
    read_timeout: Duration,
    shutdown: CancellationToken,
}

impl<T: NetworkClient> RequestServer<T> {
    pub fn new(
        node: ChordNode<T>,
        listener: TcpListener,
        worker_pool_size: usize,
        read_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            node,
            listener,
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            read_timeout,
            shutdown,
        }
    }

    /// Accepts connections until cancelled, then closes the listener.
    ///
    /// Each connection is handled in its own task once a worker permit is
    /// free, so a slow peer never stalls the accept loop.
    pub async fn run(self) {
        let address = self.node.info.address;
        log_info!(address, "Listening for requests");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, _)) => {
                    let node = self.node.clone();
                    let workers = self.workers.clone();
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        let _permit = match workers.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => return,
                        };
                        handle_connection(&node, socket, read_timeout).await;
                    });
                }
                Err(e) => {
                    log_error!(address, "Failed to accept connection: {}", e);
                }
            }
        }

        // Queued connections are dropped; in-flight ones finish on their own.
        self.workers.close();
        drop(self.listener);
        log_info!(address, "Stopped listening");
    }
}

async fn handle_connection<T: NetworkClient>(
    node: &ChordNode<T>,
    socket: TcpStream,
    read_timeout: Duration,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    match timeout(read_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(0)) => return,
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            log_error!(node.info.address, "Failed to read from socket: {}", e);
            return;
        }
        Err(_) => {
            debug!("[{}] Peer sent no request in time", node.info.address);
            return;
        }
    }

    let request = match line.parse::<Request>() {
        Ok(request) => request,
        Err(e) => {
            debug!("[{}] Ignoring request {:?}: {}", node.info.address, line.trim(), e);
            return;
        }
    };

    debug!("[{}] Received {}", node.info.address, request);
    let response = node.handle_request(request).await;

    if let Err(e) = write_half
        .write_all(format!("{}\n", response).as_bytes())
        .await
    {
        log_error!(node.info.address, "Failed to write response to socket: {}", e);
        return;
    }
    let _ = write_half.shutdown().await;
}
