use chordring_lib::identifier::{
    finger_start, hash_address, position_percent, to_hex, IdentifierFn, RingId, M,
};
use chordring_lib::protocol::{Request, Response};
use chordring_lib::{in_half_open, in_open};
use log::debug;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::NodeError;
use crate::network_client::{is_alive, request_address, send, NetworkClient};

/// Upper bound on advance steps in `find_predecessor`.
pub const MAX_LOOKUP_HOPS: usize = 4 * M;

/// Upper bound on the predecessor walk used to repair a dead successor.
pub const PREDECESSOR_WALK_LIMIT: usize = 2 * M;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: RingId,
    pub address: SocketAddr,
}

/// Slot `i` (0-based) points at the node responsible for `id + 2^i`; slot 0 is
/// the successor.
pub type FingerTable = [Option<NodeInfo>; M];

/// Direction of a predecessor notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Tell the other node we might be its predecessor.
    Notify,
    /// The other node claims to be our predecessor.
    Notified,
}

/// Local state of one ring member.
///
/// `predecessor` is the only field whose read-check-write sequences must not
/// interleave, so every decision on it happens under its lock. The finger
/// table is locked per access only so entries are never torn: routing works on
/// snapshots and tolerates stale entries, which maintenance corrects later.
pub struct ChordNode<T: NetworkClient> {
    pub info: NodeInfo,
    pub(crate) predecessor: Arc<Mutex<Option<NodeInfo>>>,
    pub(crate) finger_table: Arc<Mutex<FingerTable>>,
    pub(crate) network_client: Arc<T>,
    identifier_fn: IdentifierFn,
}

impl<T: NetworkClient> Clone for ChordNode<T> {
    fn clone(&self) -> Self {
        ChordNode {
            info: self.info,
            predecessor: self.predecessor.clone(),
            finger_table: self.finger_table.clone(), // This clones the Arc, not the table
            network_client: self.network_client.clone(),
            identifier_fn: self.identifier_fn,
        }
    }
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: NetworkClient> ChordNode<T> {
    pub fn new(address: SocketAddr, network_client: Arc<T>) -> Self {
        Self::with_identifier_fn(address, network_client, hash_address)
    }

    /// Builds a node whose identifiers (its own and its peers') come from
    /// `identifier_fn`. All nodes of a ring must share the same function.
    pub fn with_identifier_fn(
        address: SocketAddr,
        network_client: Arc<T>,
        identifier_fn: IdentifierFn,
    ) -> Self {
        let info = NodeInfo {
            id: identifier_fn(&address),
            address,
        };

        ChordNode {
            info,
            predecessor: Arc::new(Mutex::new(None)),
            finger_table: Arc::new(Mutex::new([None; M])),
            network_client,
            identifier_fn,
        }
    }

    pub fn id(&self) -> RingId {
        self.info.id
    }

    pub fn address(&self) -> SocketAddr {
        self.info.address
    }

    /// Identity of a peer known only by its address.
    pub fn peer(&self, address: SocketAddr) -> NodeInfo {
        NodeInfo {
            id: (self.identifier_fn)(&address),
            address,
        }
    }

    fn is_self(&self, node: &NodeInfo) -> bool {
        node.address == self.info.address
    }

    pub fn successor(&self) -> Option<NodeInfo> {
        self.finger(0)
    }

    pub fn predecessor(&self) -> Option<NodeInfo> {
        *lock(&self.predecessor)
    }

    pub fn finger(&self, slot: usize) -> Option<NodeInfo> {
        lock(&self.finger_table).get(slot).copied().flatten()
    }

    /// Snapshot of the whole finger table.
    pub fn fingers(&self) -> FingerTable {
        *lock(&self.finger_table)
    }

    pub fn clear_predecessor(&self) {
        *lock(&self.predecessor) = None;
    }

    /// Clears the predecessor only if it still is `address`.
    pub(crate) fn clear_predecessor_if(&self, address: SocketAddr) -> bool {
        let mut predecessor = lock(&self.predecessor);
        if predecessor.map(|p| p.address) == Some(address) {
            *predecessor = None;
            true
        } else {
            false
        }
    }

    fn successor_missing(&self) -> bool {
        self.successor().map_or(true, |s| self.is_self(&s))
    }

    /// Connects this node to a ring through `contact`.
    ///
    /// A contact equal to our own address starts a new single-node ring.
    /// Otherwise the contact resolves our successor, which is then notified.
    pub async fn join(&self, contact: Option<SocketAddr>) -> Result<(), NodeError> {
        let contact = contact.ok_or(NodeError::NoContact)?;

        if contact == self.info.address {
            log_info!(self.info.address, "Starting a new ring. I am the only node.");
            self.update_finger(0, Some(self.info)).await;
            self.clear_predecessor();
            return Ok(());
        }

        log_info!(self.info.address, "Attempting to join the ring via {}", contact);
        let successor = request_address(
            &*self.network_client,
            contact,
            Request::FindSuccessor(self.info.id),
        )
        .await
        .map(|address| self.peer(address))
        .ok_or(NodeError::JoinFailed(contact))?;

        self.update_finger(0, Some(successor)).await;
        log_info!(
            self.info.address,
            "Joined the ring. Successor: {} at {}",
            to_hex(successor.id),
            successor.address
        );
        Ok(())
    }

    /// Node believed responsible for `id`. Falls back to ourselves.
    pub async fn search_successor(&self, id: RingId) -> NodeInfo {
        let predecessor = self.find_predecessor(id).await;
        let successor = if self.is_self(&predecessor) {
            self.successor()
        } else {
            request_address(
                &*self.network_client,
                predecessor.address,
                Request::YourSuccessor,
            )
            .await
            .map(|address| self.peer(address))
        };
        successor.unwrap_or(self.info)
    }

    /// Walks the ring towards the node whose `(node, successor]` range holds `id`.
    ///
    /// Stops at the last node that answered when a probe fails or a step makes
    /// no progress, so a broken ring degrades the answer instead of looping.
    pub async fn find_predecessor(&self, id: RingId) -> NodeInfo {
        let mut current = self.info;
        let mut current_successor = self.successor();

        for _ in 0..MAX_LOOKUP_HOPS {
            if let Some(successor) = current_successor {
                if in_half_open(id, current.id, successor.id) {
                    return current;
                }
            }

            let next = if self.is_self(&current) {
                self.closest_preceding_finger(id).await
            } else {
                match request_address(&*self.network_client, current.address, Request::Closest(id))
                    .await
                {
                    Some(address) => self.peer(address),
                    None => {
                        debug!(
                            "[{}] Lookup of {}: {} did not answer CLOSEST",
                            self.info.address, id, current.address
                        );
                        return current;
                    }
                }
            };

            if next.address == current.address {
                return current;
            }

            current_successor = if self.is_self(&next) {
                self.successor()
            } else {
                match request_address(&*self.network_client, next.address, Request::YourSuccessor)
                    .await
                {
                    Some(address) => Some(self.peer(address)),
                    None => {
                        debug!(
                            "[{}] Lookup of {}: {} did not answer YOURSUCC",
                            self.info.address, id, next.address
                        );
                        return current;
                    }
                }
            };
            current = next;
        }

        debug!(
            "[{}] Lookup of {} gave up after {} hops at {}",
            self.info.address, id, MAX_LOOKUP_HOPS, current.address
        );
        current
    }

    /// Highest finger strictly between us and `id` that answers a liveness
    /// probe. Dead fingers found on the way are evicted from every slot.
    pub async fn closest_preceding_finger(&self, id: RingId) -> NodeInfo {
        for slot in (0..M).rev() {
            let finger = match self.finger(slot) {
                Some(finger) => finger,
                None => continue,
            };
            if !in_open(finger.id, self.info.id, id) {
                continue;
            }
            if is_alive(&*self.network_client, finger.address).await {
                return finger;
            }
            log_info!(
                self.info.address,
                "Finger {} at slot {} is unreachable, evicting it",
                finger.address,
                slot + 1
            );
            self.evict_finger(finger.address);
        }
        self.info
    }

    /// Drops `address` from every slot of the finger table.
    pub fn evict_finger(&self, address: SocketAddr) {
        let mut finger_table = lock(&self.finger_table);
        for entry in finger_table.iter_mut() {
            if entry.map(|f| f.address) == Some(address) {
                *entry = None;
            }
        }
    }

    /// Sets one slot. A new successor other than ourselves is notified that
    /// we might be its predecessor.
    pub async fn update_finger(&self, slot: usize, value: Option<NodeInfo>) {
        {
            let mut finger_table = lock(&self.finger_table);
            match finger_table.get_mut(slot) {
                Some(entry) => *entry = value,
                None => return,
            }
        }

        if slot == 0 {
            if let Some(successor) = value {
                if !self.is_self(&successor) {
                    self.process_notification(successor, Notification::Notify)
                        .await;
                }
            }
        }
    }

    pub async fn process_notification(&self, other: NodeInfo, kind: Notification) {
        if self.is_self(&other) {
            return;
        }
        match kind {
            Notification::Notify => {
                match send(
                    &*self.network_client,
                    other.address,
                    Request::PredecessorFound(self.info.address),
                )
                .await
                {
                    Some(Response::Notified) => {
                        debug!("[{}] Notified {}", self.info.address, other.address);
                    }
                    response => {
                        debug!(
                            "[{}] Notify to {} not acknowledged: {:?}",
                            self.info.address, other.address, response
                        );
                    }
                }
            }
            Notification::Notified => {
                if self.accept_predecessor(other) {
                    log_info!(self.info.address, "New predecessor {}", other.address);
                }
            }
        }
    }

    // Takes `candidate` as predecessor if we have none, or it sits strictly
    // between the current one and us.
    fn accept_predecessor(&self, candidate: NodeInfo) -> bool {
        let mut predecessor = lock(&self.predecessor);
        let accept = match *predecessor {
            None => true,
            Some(current) if self.is_self(&current) => true,
            Some(current) => in_open(candidate.id, current.id, self.info.id),
        };
        if accept {
            *predecessor = Some(candidate);
        }
        accept
    }

    /// Drops a dead successor and everything routed through it, then finds a
    /// replacement among the surviving fingers, the predecessor, and the
    /// predecessor chain.
    pub async fn delete_successor(&self) {
        let dead = match self.successor() {
            Some(successor) => successor,
            None => return,
        };
        log_info!(self.info.address, "Successor {} is dead, removing it", dead.address);

        {
            let mut finger_table = lock(&self.finger_table);
            let break_slot = finger_table
                .iter()
                .rposition(|f| f.map(|f| f.address) == Some(dead.address))
                .unwrap_or(M - 1);
            for entry in finger_table.iter_mut().take(break_slot + 1) {
                *entry = None;
            }
        }
        self.clear_predecessor_if(dead.address);

        self.fill_successor().await;

        let predecessor = match self.predecessor() {
            Some(predecessor) if !self.is_self(&predecessor) => predecessor,
            _ => return,
        };
        let successor = self.successor();
        let candidate = self
            .walk_predecessors(predecessor, successor, dead.address)
            .await;
        let adopt = match successor {
            None => true,
            Some(successor) if self.is_self(&successor) => true,
            Some(successor) => in_open(candidate.id, self.info.id, successor.id),
        };
        if adopt && !self.is_self(&candidate) {
            log_info!(
                self.info.address,
                "Closest surviving successor is {}",
                candidate.address
            );
            self.update_finger(0, Some(candidate)).await;
        }
    }

    // Follows predecessor pointers back from `start` until they reach us, our
    // successor, the dead node, or stop answering. The last node reached is
    // the closest live node after the dead one.
    async fn walk_predecessors(
        &self,
        start: NodeInfo,
        successor: Option<NodeInfo>,
        dead: SocketAddr,
    ) -> NodeInfo {
        let mut current = start;
        for _ in 0..PREDECESSOR_WALK_LIMIT {
            let previous = match request_address(
                &*self.network_client,
                current.address,
                Request::FindPredecessor,
            )
            .await
            {
                Some(address) => self.peer(address),
                None => break,
            };
            if previous.address == current.address
                || previous.address == dead
                || self.is_self(&previous)
                || successor.map(|s| s.address) == Some(previous.address)
            {
                break;
            }
            current = previous;
        }
        current
    }

    /// Repairs a missing successor: copies the nearest live-looking finger
    /// down into the lower slots, else falls back to the predecessor, else to
    /// ourselves.
    pub async fn fill_successor(&self) {
        if self.successor_missing() {
            let replacement = lock(&self.finger_table)
                .iter()
                .enumerate()
                .skip(1)
                .find_map(|(slot, f)| f.filter(|f| !self.is_self(f)).map(|f| (slot, f)));
            if let Some((slot, finger)) = replacement {
                for lower in (0..slot).rev() {
                    self.update_finger(lower, Some(finger)).await;
                }
            }
        }

        if self.successor_missing() {
            if let Some(predecessor) = self.predecessor() {
                if !self.is_self(&predecessor) {
                    self.update_finger(0, Some(predecessor)).await;
                }
            }
        }

        if self.successor().is_none() {
            self.update_finger(0, Some(self.info)).await;
        }
    }

    /// Answers one decoded request from a peer.
    pub async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Closest(id) => {
                Response::MyClosest(self.closest_preceding_finger(id).await.address)
            }
            Request::YourSuccessor => self
                .successor()
                .map_or(Response::Nothing, |s| Response::MySuccessor(s.address)),
            Request::FindPredecessor => self
                .predecessor()
                .map_or(Response::Nothing, |p| Response::PredecessorResult(p.address)),
            Request::FindSuccessor(id) => {
                Response::FoundSuccessor(self.search_successor(id).await.address)
            }
            Request::PredecessorFound(address) => {
                self.process_notification(self.peer(address), Notification::Notified)
                    .await;
                Response::Notified
            }
            Request::Keep => Response::Alive,
        }
    }

    fn describe(&self, node: Option<NodeInfo>) -> String {
        match node {
            Some(node) if !self.is_self(&node) => format!(
                "{}, {} ({}%)",
                node.address,
                to_hex(node.id),
                position_percent(node.id)
            ),
            _ => "Self".to_string(),
        }
    }

    /// Predecessor and successor, one line each.
    pub fn neighbors_report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "{:<15} {:<40}", "Neighbor", "Address");
        let _ = writeln!(report, "{:<15} {:<40}", "Predecessor", self.describe(self.predecessor()));
        let _ = write!(report, "{:<15} {:<40}", "Successor", self.describe(self.successor()));
        report
    }

    /// Identifier, predecessor, and every finger slot with its start identifier.
    pub fn state_report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(
            report,
            "LOCAL: {}\t{} ({}%)",
            self.info.address,
            to_hex(self.info.id),
            position_percent(self.info.id)
        );
        let predecessor = match self.predecessor() {
            Some(p) => format!("{}\t{} ({}%)", p.address, to_hex(p.id), position_percent(p.id)),
            None => "NULL".to_string(),
        };
        let _ = writeln!(report, "PREDECESSOR: {}", predecessor);
        let _ = writeln!(report, "--- Finger Table ---");
        let _ = writeln!(
            report,
            "{:<5} {:<10} {:<30} {:<20}",
            "Index", "Start", "Node Address", "Position"
        );
        for (slot, finger) in self.fingers().iter().enumerate() {
            let (address, position) = match finger {
                Some(f) => (
                    f.address.to_string(),
                    format!("{} ({}%)", to_hex(f.id), position_percent(f.id)),
                ),
                None => ("NULL".to_string(), String::new()),
            };
            let _ = writeln!(
                report,
                "{:<5} {:<10} {:<30} {:<20}",
                slot + 1,
                to_hex(finger_start(self.info.id, slot)),
                address,
                position
            );
        }
        report
    }
}
