//! Error types for gossipd.

use gossip_p2p::P2pError;
use gossip_proto::ProtoError;
use thiserror::Error;

/// Errors that can occur running a gossip node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to bind a listen address.
    #[error("failed to bind {0}: {1}")]
    BindFailed(String, #[source] std::io::Error),

    /// The bootstrap handshake at startup failed.
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] P2pError),

    /// Gossip core error.
    #[error("gossip error: {0}")]
    P2p(#[from] P2pError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// The API server answered a request with an error.
    #[error("api request rejected: {0}")]
    Rejected(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
