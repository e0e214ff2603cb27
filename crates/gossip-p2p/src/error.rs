//! Error types for gossip-p2p.

use gossip_proto::ProtoError;
use thiserror::Error;

/// Errors that can occur in gossip operations.
#[derive(Debug, Error)]
pub enum P2pError {
    /// Connecting to or writing to a peer failed.
    #[error("connection to {addr} failed: {source}")]
    Connection {
        /// Peer address.
        addr: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A peer operation did not finish in time.
    #[error("{operation} timed out for {addr}")]
    Timeout {
        /// Peer address.
        addr: String,
        /// Operation that timed out.
        operation: &'static str,
    },

    /// Wire data could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// Proof-of-work search failed.
    #[error("proof of work failed: {0}")]
    Pow(String),

    /// Bootstrap service rejected a request or returned bad data.
    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    /// HTTP transport error talking to the bootstrap service.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
