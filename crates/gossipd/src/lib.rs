//! # gossipd
//!
//! A gossip node process. It listens for peer messages, serves the local
//! application API, keeps its peer view fresh through the bootstrap service
//! and seed nodes, and announces itself on start and stop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api_server;
pub mod client;
pub mod config;
pub mod error;
pub mod node;

pub use api_server::{ApiBridge, ApiServer, dispatch_notifications};
pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{GossipNode, NodeHandle};
