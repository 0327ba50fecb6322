use crate::integration::{NetworkSimulator, SimulatedNetworkClient, SimulatorMessage};
use chordring_lib::identifier::{RingId, M};
use chordring_node::{ChordNode, NodeError};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Identifier function used by every simulated node: the port is the id, so
/// scenarios choose ring positions by choosing ports.
pub fn port_id(address: &SocketAddr) -> RingId {
    RingId::from(address.port())
}

pub fn local_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub type SimulatedNode = Arc<ChordNode<SimulatedNetworkClient>>;

/// Main test harness that orchestrates multi-node ring tests
pub struct TestHarness {
    /// Simulated network for message routing
    network: NetworkSimulator,
    /// Running node instances, ordered by address
    nodes: Arc<RwLock<BTreeMap<SocketAddr, SimulatedNode>>>,
    /// Request processing tasks, one per node
    tasks: Vec<JoinHandle<()>>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Create a new test harness
    pub fn new() -> Self {
        Self {
            network: NetworkSimulator::new(),
            nodes: Arc::new(RwLock::new(BTreeMap::new())),
            tasks: Vec::new(),
        }
    }

    /// Add a node whose identifier is `port` and start serving its requests
    pub async fn add_node(&mut self, port: u16) -> SocketAddr {
        let address = local_address(port);
        let (tx, mut rx) = mpsc::unbounded_channel::<SimulatorMessage>();
        self.network.register_node(address, tx).await;

        let network_client = Arc::new(self.network.create_client());
        let chord_node = Arc::new(ChordNode::with_identifier_fn(
            address,
            network_client,
            port_id,
        ));
        self.nodes.write().await.insert(address, chord_node.clone());

        // Each request is handled in its own task, like connections on a real
        // listener, so nested calls back into this node cannot deadlock.
        self.tasks.push(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let node = chord_node.clone();
                tokio::spawn(async move {
                    let response = node.handle_request(message.request).await;
                    let _ = message.response_sender.send(response);
                });
            }
        }));

        address
    }

    /// Join `node` through `contact`, or start a new ring when there is none
    pub async fn connect(
        &self,
        node: SocketAddr,
        contact: Option<SocketAddr>,
    ) -> Result<(), NodeError> {
        let chord_node = self
            .get_node(&node)
            .await
            .ok_or_else(|| NodeError::Resolve(node.to_string()))?;
        chord_node.join(Some(contact.unwrap_or(node))).await
    }

    /// Add nodes for all `ports` and join each through the first one
    pub async fn build_ring(&mut self, ports: &[u16]) -> Result<Vec<SocketAddr>, NodeError> {
        let mut addresses = Vec::with_capacity(ports.len());
        for &port in ports {
            let address = self.add_node(port).await;
            self.connect(address, addresses.first().copied()).await?;
            addresses.push(address);
        }
        Ok(addresses)
    }

    /// Simulate node failure
    pub async fn fail_node(&self, address: SocketAddr) {
        self.network.mark_node_failed(address).await;
    }

    /// Simulate node recovery. The node resumes with the state it had when
    /// it failed.
    pub async fn recover_node(&self, address: &SocketAddr) {
        self.network.mark_node_recovered(address).await;
    }

    /// Take a node out of the network entirely: connections to it are
    /// refused instead of going unanswered
    pub async fn remove_node(&self, address: &SocketAddr) -> Option<SimulatedNode> {
        self.network.unregister_node(address).await;
        self.nodes.write().await.remove(address)
    }

    /// Get node by address
    pub async fn get_node(&self, address: &SocketAddr) -> Option<SimulatedNode> {
        self.nodes.read().await.get(address).cloned()
    }

    /// Addresses of nodes that have not been failed, ordered by identifier
    pub async fn live_node_addresses(&self) -> Vec<SocketAddr> {
        let nodes: Vec<_> = self.nodes.read().await.keys().copied().collect();
        let mut live = Vec::with_capacity(nodes.len());
        for address in nodes {
            if !self.network.is_node_failed(&address).await {
                live.push(address);
            }
        }
        live.sort_by_key(port_id);
        live
    }

    /// Node that should own `id` given the live membership
    pub async fn expected_owner(&self, id: RingId) -> Option<SocketAddr> {
        let live = self.live_node_addresses().await;
        live.iter()
            .find(|address| port_id(address) >= id)
            .or_else(|| live.first())
            .copied()
    }

    /// Trigger a single maintenance cycle on every live node
    pub async fn trigger_stabilization_round(&self) {
        for address in self.live_node_addresses().await {
            if let Some(node) = self.get_node(&address).await {
                node.run_maintenance_cycle().await;
            }
        }
    }

    /// Trigger multiple rounds of stabilization
    pub async fn trigger_stabilization_cycles(&self, rounds: usize) {
        for _ in 0..rounds {
            self.trigger_stabilization_round().await;
        }
    }

    /// Run rounds until every ring invariant holds, returning the number of
    /// rounds it took
    pub async fn stabilize_until_consistent(&self, max_rounds: usize) -> Result<usize, String> {
        for round in 0..=max_rounds {
            let violations = crate::integration::NetworkInvariants::check_all(self).await;
            if violations.is_empty() {
                return Ok(round);
            }
            if round == max_rounds {
                return Err(format!(
                    "ring not consistent after {} rounds: {:?}",
                    max_rounds, violations
                ));
            }
            self.trigger_stabilization_round().await;
        }
        Err("no rounds run".to_string())
    }

    /// Refresh every finger slot of every live node
    pub async fn fix_all_fingers(&self) {
        for address in self.live_node_addresses().await {
            if let Some(node) = self.get_node(&address).await {
                for slot in 1..M {
                    node.fix_finger(slot).await;
                }
            }
        }
    }

    /// Access the network simulator for advanced control
    pub fn network(&self) -> &NetworkSimulator {
        &self.network
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        // Clean up tasks
        for task in &self.tasks {
            task.abort();
        }
    }
}
