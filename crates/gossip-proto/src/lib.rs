//! # gossip-proto
//!
//! Wire formats spoken by a gossip node.
//!
//! - [`GossipMessage`]: the unit of dissemination exchanged between peers,
//!   prost-encoded and length-delimited, one record per TCP connection.
//! - [`ApiMessage`] and [`ApiCodec`]: the big-endian framing used by local
//!   applications to announce data and subscribe to datatypes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod error;
pub mod message;

pub use api::{ApiCodec, ApiMessage, message_types};
pub use error::ProtoError;
pub use message::{
    GossipMessage, MAX_WIRE_MESSAGE_SIZE, MessageId, MessageKind, wire_kinds,
};
