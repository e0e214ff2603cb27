//! # gossip-p2p
//!
//! Epidemic dissemination core of a gossip node.
//!
//! This crate provides:
//!
//! - A proof-of-work gate that stamps and validates every peer message
//! - A bounded duplicate cache with FIFO eviction
//! - A degree-bounded peer set with seed-node tracking
//! - The dissemination engine: fanout flooding, TTL handling and dispatch of
//!   inbound messages by kind
//! - The peer-discovery sub-protocol (join, leave, peer-list exchange)
//! - An HTTP client for the bootstrap registry
//!
//! ## Core Types
//!
//! - [`GossipEngine`]: owns the shared node state and floods messages
//! - [`PeerSet`]: known peers, seed nodes and the degree bound
//! - [`DuplicateCache`]: recency set of processed message IDs
//! - [`InterestMap`]: datatype subscriptions of local API connections
//! - [`Transport`]: how a message reaches a peer address

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod cache;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod interest;
pub mod peers;
pub mod pow;
pub mod transport;

pub use bootstrap::{BootstrapClient, PeerView, apply_peer_view};
pub use cache::DuplicateCache;
pub use engine::{BroadcastResult, EngineConfig, GossipEngine, InboundOutcome};
pub use error::P2pError;
pub use interest::{InterestMap, Notification};
pub use peers::PeerSet;
pub use pow::Difficulty;
pub use transport::{BoxFuture, TcpTransport, Transport, read_message};
