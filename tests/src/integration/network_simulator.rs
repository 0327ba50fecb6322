use async_trait::async_trait;
use chordring_lib::protocol::{Request, Response};
use chordring_node::{NetworkClient, TransportError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Simulates network communication between nodes in the test environment
/// Routes protocol requests between nodes without actual TCP connections
#[derive(Clone)]
pub struct NetworkSimulator {
    /// Maps node addresses to message channels
    nodes: Arc<RwLock<HashMap<SocketAddr, mpsc::UnboundedSender<SimulatorMessage>>>>,
    /// Controls message delivery timing and failures
    delivery_controller: Arc<RwLock<DeliveryController>>,
}

/// Request delivered to a simulated node, with the channel for its answer.
/// Dropping `response_sender` without answering means "no response".
#[derive(Debug)]
pub struct SimulatorMessage {
    pub request: Request,
    pub response_sender: oneshot::Sender<Response>,
}

#[derive(Default)]
struct DeliveryController {
    /// Addresses that should fail message delivery
    failed_nodes: HashSet<SocketAddr>,
    /// Simulated network latency in milliseconds
    latency_ms: u64,
}

impl Default for NetworkSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSimulator {
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            delivery_controller: Arc::new(RwLock::new(DeliveryController::default())),
        }
    }

    /// Register a node with the simulator
    pub async fn register_node(
        &self,
        address: SocketAddr,
        sender: mpsc::UnboundedSender<SimulatorMessage>,
    ) {
        self.nodes.write().await.insert(address, sender);
    }

    /// Remove a node from the simulator (connections to it are refused)
    pub async fn unregister_node(&self, address: &SocketAddr) {
        self.nodes.write().await.remove(address);
    }

    /// Mark a node as failed (requests to it are never answered)
    pub async fn mark_node_failed(&self, address: SocketAddr) {
        self.delivery_controller
            .write()
            .await
            .failed_nodes
            .insert(address);
    }

    /// Mark a node as recovered
    pub async fn mark_node_recovered(&self, address: &SocketAddr) {
        self.delivery_controller
            .write()
            .await
            .failed_nodes
            .remove(address);
    }

    pub async fn is_node_failed(&self, address: &SocketAddr) -> bool {
        self.delivery_controller
            .read()
            .await
            .failed_nodes
            .contains(address)
    }

    /// Set simulated network latency
    pub async fn set_latency(&self, latency_ms: u64) {
        self.delivery_controller.write().await.latency_ms = latency_ms;
    }

    /// Check if a node is registered
    pub async fn is_node_registered(&self, address: &SocketAddr) -> bool {
        self.nodes.read().await.contains_key(address)
    }

    /// Create a NetworkClient for a specific node
    pub fn create_client(&self) -> SimulatedNetworkClient {
        SimulatedNetworkClient {
            simulator: self.clone(),
        }
    }
}

/// NetworkClient implementation that uses the simulator for message delivery
#[derive(Clone)]
pub struct SimulatedNetworkClient {
    simulator: NetworkSimulator,
}

#[async_trait]
impl NetworkClient for SimulatedNetworkClient {
    async fn call_node(
        &self,
        address: SocketAddr,
        request: Request,
    ) -> Result<Response, TransportError> {
        let latency_ms = {
            let controller = self.simulator.delivery_controller.read().await;
            // A failed node accepts nothing and answers nothing
            if controller.failed_nodes.contains(&address) {
                return Err(TransportError::NoResponse(address));
            }
            controller.latency_ms
        };

        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }

        let sender = self
            .simulator
            .nodes
            .read()
            .await
            .get(&address)
            .cloned()
            .ok_or_else(|| TransportError::Connect {
                address,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })?;

        let (response_tx, response_rx) = oneshot::channel();
        sender
            .send(SimulatorMessage {
                request,
                response_sender: response_tx,
            })
            .map_err(|_| TransportError::NoResponse(address))?;

        match tokio::time::timeout(NetworkSimulator::RESPONSE_TIMEOUT, response_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::NoResponse(address)),
            Err(_) => Err(TransportError::Timeout {
                address,
                timeout: NetworkSimulator::RESPONSE_TIMEOUT,
            }),
        }
    }
}
