use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;
use crate::network_client::{NetworkClient, RealNetworkClient};
use crate::node::ChordNode;
use crate::server::RequestServer;
use crate::stabilizer::Stabilizer;
use crate::Config;

/// A ring node together with its listener and background tasks.
pub struct ChordService<T: NetworkClient = RealNetworkClient> {
    node: ChordNode<T>,
    listener: Option<TcpListener>,
    config: Config,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ChordService<RealNetworkClient> {
    /// Binds the listening socket. The node advertises the bound address, so
    /// port 0 yields a node on an ephemeral port.
    pub async fn bind(config: Config) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(config.address)
            .await
            .map_err(|source| NodeError::Bind {
                address: config.address,
                source,
            })?;
        let client = Arc::new(RealNetworkClient::new(config.request_timeout));
        Self::with_listener(listener, config, client)
    }
}

impl<T: NetworkClient> ChordService<T> {
    pub fn with_listener(
        listener: TcpListener,
        config: Config,
        network_client: Arc<T>,
    ) -> Result<Self, NodeError> {
        let address = listener.local_addr().map_err(|source| NodeError::Bind {
            address: config.address,
            source,
        })?;

        Ok(Self {
            node: ChordNode::new(address, network_client),
            listener: Some(listener),
            config,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    pub fn node(&self) -> &ChordNode<T> {
        &self.node
    }

    pub fn address(&self) -> SocketAddr {
        self.node.address()
    }

    /// Joins the ring through `contact`, then starts serving requests and
    /// running maintenance. On failure nothing is left running.
    pub async fn join(&mut self, contact: Option<SocketAddr>) -> Result<(), NodeError> {
        self.node.join(contact).await?;

        let listener = match self.listener.take() {
            Some(listener) => listener,
            // Already joined and running.
            None => return Ok(()),
        };

        let server = RequestServer::new(
            self.node.clone(),
            listener,
            self.config.worker_pool_size,
            self.config.request_timeout,
            self.shutdown.clone(),
        );
        let stabilizer = Stabilizer::new(
            self.node.clone(),
            self.config.stabilize_interval,
            self.shutdown.clone(),
        );
        self.tasks.push(tokio::spawn(server.run()));
        self.tasks.push(tokio::spawn(stabilizer.run()));
        Ok(())
    }

    /// Stops both background tasks and waits for them.
    pub async fn shutdown(&mut self) {
        log_info!(self.node.info.address, "Shutting down");
        self.shutdown.cancel();
        self.listener = None;
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl<T: NetworkClient> Drop for ChordService<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
