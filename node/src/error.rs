//! Error types for the ring node.

use std::net::SocketAddr;
use std::time::Duration;

use chordring_lib::protocol::ProtocolError;

/// Failure of one request/response exchange with a peer.
///
/// Routing code never propagates these: a failed exchange means "peer
/// unreachable" and is folded into a `None` answer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not open a connection to the peer.
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The exchange did not complete in time.
    #[error("{address} did not answer within {timeout:?}")]
    Timeout { address: SocketAddr, timeout: Duration },

    /// Reading or writing the stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection without answering.
    #[error("{0} closed the connection without a response")]
    NoResponse(SocketAddr),

    /// The response line could not be decoded.
    #[error("malformed response: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Startup and join failures, the only errors surfaced to the operator.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The listening socket could not be bound.
    #[error("cannot bind listener on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An address (our own or the contact's) could not be resolved.
    #[error("cannot resolve address {0}")]
    Resolve(String),

    /// `join` was called without any contact.
    #[error("no contact address to join through")]
    NoContact,

    /// The contact did not resolve a successor for us.
    #[error("joining through {0} failed: no successor found")]
    JoinFailed(SocketAddr),
}
