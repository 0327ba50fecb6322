//! Integration testing framework for Chord rings
//!
//! Simulates a ring of nodes in one process without real sockets:
//!
//! - Multi-node network simulation with node failure injection
//! - Request routing between simulated nodes through the real request handler
//! - Manually driven maintenance rounds
//! - Ring invariant validation

pub mod network_simulator;
pub mod test_harness;

pub use invariants::{InvariantViolation, NetworkInvariants};
pub use network_simulator::{NetworkSimulator, SimulatedNetworkClient, SimulatorMessage};
pub use test_harness::{local_address, port_id, SimulatedNode, TestHarness};
