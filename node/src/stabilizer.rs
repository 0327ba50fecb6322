//! Periodic ring maintenance.
//!
//! Each cycle probes the predecessor, refreshes one random finger and
//! stabilizes the successor pointer. Cycles are independent: whatever one
//! leaves broken the next one retries.

use chordring_lib::identifier::{finger_start, M};
use chordring_lib::in_open;
use chordring_lib::protocol::Request;
use log::debug;
use rand::Rng;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::network_client::{is_alive, request_address, NetworkClient};
use crate::node::{ChordNode, Notification};

impl<T: NetworkClient> ChordNode<T> {
    /// Clears the predecessor if it no longer answers `KEEP`.
    pub async fn check_predecessor(&self) {
        if let Some(predecessor) = self.predecessor() {
            if is_alive(&*self.network_client, predecessor.address).await {
                return;
            }
            // It may have been replaced by a notify while we were probing.
            if self.clear_predecessor_if(predecessor.address) {
                log_info!(
                    self.info.address,
                    "Predecessor {} is unreachable, clearing it",
                    predecessor.address
                );
            }
        }
    }

    /// Refreshes one random finger above the successor slot.
    pub async fn fix_fingers(&self) {
        // Pick a random finger to fix, to avoid all nodes fixing the same finger at the same time.
        let slot = rand::thread_rng().gen_range(1..M);
        self.fix_finger(slot).await;
    }

    pub async fn fix_finger(&self, slot: usize) {
        let target_id = finger_start(self.info.id, slot);
        let successor = self.search_successor(target_id).await;
        debug!(
            "[{}] Fix finger {}: start {} resolves to {}",
            self.info.address,
            slot + 1,
            target_id,
            successor.address
        );
        self.update_finger(slot, Some(successor)).await;
    }

    pub async fn stabilize(&self) {
        let successor = match self.successor() {
            Some(successor) if successor.address != self.info.address => successor,
            _ => {
                debug!("[{}] Stabilize: no successor, filling", self.info.address);
                self.fill_successor().await;
                return;
            }
        };

        debug!(
            "[{}] Stabilize: asking successor {} for its predecessor",
            self.info.address, successor.address
        );

        let x = match request_address(
            &*self.network_client,
            successor.address,
            Request::FindPredecessor,
        )
        .await
        {
            Some(address) => self.peer(address),
            None => {
                self.delete_successor().await;
                return;
            }
        };

        // If x is between self and successor, then x is the new successor
        if x.address != self.info.address && in_open(x.id, self.info.id, successor.id) {
            debug!(
                "[{}] Stabilize: updating successor from {} to {}",
                self.info.address, successor.address, x.address
            );
            self.update_finger(0, Some(x)).await;
        } else {
            self.process_notification(successor, Notification::Notify)
                .await;
        }
    }

    /// One full maintenance cycle.
    pub async fn run_maintenance_cycle(&self) {
        self.check_predecessor().await;
        self.fix_fingers().await;
        self.stabilize().await;
    }
}

/// Drives `run_maintenance_cycle` on a fixed period until cancelled.
pub struct Stabilizer<T: NetworkClient> {
    node: ChordNode<T>,
    period: Duration,
    shutdown: CancellationToken,
}

impl<T: NetworkClient> Stabilizer<T> {
    pub fn new(node: ChordNode<T>, period: Duration, shutdown: CancellationToken) -> Self {
        Self {
            node,
            period,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.node.run_maintenance_cycle() => {}
                    }
                }
            }
        }
        debug!("[{}] Maintenance loop stopped", self.node.info.address);
    }
}
