//! Chord ring node library
//!
//! A node owns a 32-slot finger table and a predecessor pointer, answers
//! routing requests from its peers over a one-line text protocol, and keeps
//! its view of the ring correct with a periodic stabilization loop. It can be
//! used from the `chordring-node` binary or embedded for integration testing.

macro_rules! log_info {
    ($address:expr, $($arg:tt)*) => ({
        log::info!("[{}] {}", $address, format_args!($($arg)*));
    })
}

macro_rules! log_error {
    ($address:expr, $($arg:tt)*) => ({
        log::error!("[{}] {}", $address, format_args!($($arg)*));
    })
}

pub mod error;
pub mod network_client;
pub mod node;
pub mod server;
pub mod service;
pub mod stabilizer;

use std::net::SocketAddr;
use std::time::Duration;

// Re-export main types for public API
pub use error::{NodeError, TransportError};
pub use network_client::{NetworkClient, RealNetworkClient};
pub use node::{ChordNode, FingerTable, NodeInfo, Notification};
pub use server::RequestServer;
pub use service::ChordService;
pub use stabilizer::Stabilizer;

// Re-export from lib crate for convenience
pub use chordring_lib::identifier::{RingId, M};
pub use chordring_lib::metrics::LookupMetrics;
pub use chordring_lib::protocol::{Request, Response};

/// Configuration for a ChordService
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint to bind and advertise. Port 0 picks an ephemeral port.
    pub address: SocketAddr,
    pub stabilize_interval: Duration,
    /// Connections served concurrently.
    pub worker_pool_size: usize,
    /// Budget for connecting to a peer and reading its answer.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            stabilize_interval: Duration::from_millis(500),
            worker_pool_size: 10,
            request_timeout: network_client::DEFAULT_TIMEOUT,
        }
    }
}
