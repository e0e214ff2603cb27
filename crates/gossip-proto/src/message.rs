//! Peer-to-peer gossip messages with prost serialization.
//!
//! Every record travels alone over a fresh TCP connection, prefixed with its
//! varint length.

use crate::error::ProtoError;
use prost::Message;
use std::fmt;

/// Largest encoded record (including its length prefix) a node will accept.
pub const MAX_WIRE_MESSAGE_SIZE: usize = 64 * 1024;

/// Wire discriminants for the discovery message kinds.
///
/// Application data uses its datatype as the discriminant, so these values
/// are reserved and never carry payload for subscribers.
pub mod wire_kinds {
    /// A peer joined the network; payload is its address.
    pub const PEER_JOIN: i32 = 511;
    /// A peer is leaving the network; payload is its address.
    pub const PEER_LEAVE: i32 = 512;
    /// Ask the receiver for its peer list.
    pub const PEER_LIST_REQUEST: i32 = 513;
    /// Reply carrying a JSON array of peer addresses.
    pub const PEER_LIST_RESPONSE: i32 = 514;
}

/// Identifier used for duplicate suppression.
///
/// Chosen at random when a message is created and never changed while the
/// message is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    /// Creates a new random message ID.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the 16-bit form carried in local API notifications.
    #[must_use]
    pub const fn notification_id(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Kind of a gossip message, decoded from the wire discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Application data of the given datatype.
    Data(u16),
    /// Announcement that a peer joined.
    PeerJoin,
    /// Announcement that a peer left.
    PeerLeave,
    /// Unicast request for the receiver's peer list.
    PeerListRequest,
    /// Unicast reply with a peer list.
    PeerListResponse,
}

impl MessageKind {
    /// Decodes a wire discriminant.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::UnknownMessageType`] for values that are neither a
    /// discovery kind nor a valid 16-bit datatype.
    pub fn from_wire(value: i32) -> Result<Self, ProtoError> {
        match value {
            wire_kinds::PEER_JOIN => Ok(Self::PeerJoin),
            wire_kinds::PEER_LEAVE => Ok(Self::PeerLeave),
            wire_kinds::PEER_LIST_REQUEST => Ok(Self::PeerListRequest),
            wire_kinds::PEER_LIST_RESPONSE => Ok(Self::PeerListResponse),
            other => u16::try_from(other)
                .map(Self::Data)
                .map_err(|_| ProtoError::UnknownMessageType(i64::from(other))),
        }
    }

    /// Returns the wire discriminant.
    #[must_use]
    pub fn to_wire(self) -> i32 {
        match self {
            Self::Data(datatype) => i32::from(datatype),
            Self::PeerJoin => wire_kinds::PEER_JOIN,
            Self::PeerLeave => wire_kinds::PEER_LEAVE,
            Self::PeerListRequest => wire_kinds::PEER_LIST_REQUEST,
            Self::PeerListResponse => wire_kinds::PEER_LIST_RESPONSE,
        }
    }

    /// Returns true if `datatype` collides with a discovery discriminant.
    #[must_use]
    pub fn is_reserved_datatype(datatype: u16) -> bool {
        (wire_kinds::PEER_JOIN..=wire_kinds::PEER_LIST_RESPONSE).contains(&i32::from(datatype))
    }

    /// Returns true for the peer-discovery kinds.
    #[must_use]
    pub const fn is_discovery(&self) -> bool {
        !matches!(self, Self::Data(_))
    }
}

/// The unit of dissemination between peers.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct GossipMessage {
    /// Message kind discriminant, see [`MessageKind`].
    #[prost(int32, tag = "1")]
    pub kind: i32,
    /// Address of the immediate sender.
    #[prost(string, tag = "2")]
    pub from: String,
    /// Application data, a peer address, or a JSON peer list.
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
    /// Remaining hop budget.
    #[prost(int32, tag = "4")]
    pub ttl: i32,
    /// Duplicate-suppression identifier.
    #[prost(uint64, tag = "5")]
    pub message_id: u64,
    /// Proof-of-work solution.
    #[prost(uint64, tag = "6")]
    pub nonce: u64,
}

impl GossipMessage {
    fn with_kind(kind: MessageKind, from: impl Into<String>, payload: Vec<u8>, ttl: i32) -> Self {
        Self {
            kind: kind.to_wire(),
            from: from.into(),
            payload,
            ttl,
            message_id: MessageId::random().as_u64(),
            nonce: 0,
        }
    }

    /// Creates an application data message with a fresh ID.
    #[must_use]
    pub fn data(from: impl Into<String>, datatype: u16, payload: Vec<u8>, ttl: i32) -> Self {
        Self::with_kind(MessageKind::Data(datatype), from, payload, ttl)
    }

    /// Creates a join announcement for `address`.
    #[must_use]
    pub fn peer_join(address: &str, ttl: i32) -> Self {
        Self::with_kind(MessageKind::PeerJoin, address, address.as_bytes().to_vec(), ttl)
    }

    /// Creates a leave announcement for `address`.
    #[must_use]
    pub fn peer_leave(address: &str, ttl: i32) -> Self {
        Self::with_kind(MessageKind::PeerLeave, address, address.as_bytes().to_vec(), ttl)
    }

    /// Creates a peer-list request. Requests are unicast and never relayed.
    #[must_use]
    pub fn peer_list_request(from: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::PeerListRequest, from, Vec::new(), 1)
    }

    /// Creates a peer-list response carrying `peers` as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be serialized.
    pub fn peer_list_response(from: impl Into<String>, peers: &[String]) -> Result<Self, ProtoError> {
        let payload = serde_json::to_vec(peers)
            .map_err(|e| ProtoError::Encoding(format!("peer list: {e}")))?;
        Ok(Self::with_kind(MessageKind::PeerListResponse, from, payload, 1))
    }

    /// Returns the decoded message kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the discriminant is out of range.
    pub fn message_kind(&self) -> Result<MessageKind, ProtoError> {
        MessageKind::from_wire(self.kind)
    }

    /// Returns the message ID.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        MessageId::from_u64(self.message_id)
    }

    /// Decodes the payload of a join or leave announcement.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is empty or not UTF-8.
    pub fn payload_address(&self) -> Result<String, ProtoError> {
        let address = std::str::from_utf8(&self.payload)
            .map_err(|e| ProtoError::Decoding(format!("peer address: {e}")))?;
        if address.is_empty() {
            return Err(ProtoError::Decoding("empty peer address".to_string()));
        }
        Ok(address.to_string())
    }

    /// Decodes the payload of a peer-list response.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON array of strings.
    pub fn peer_addresses(&self) -> Result<Vec<String>, ProtoError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| ProtoError::Decoding(format!("peer list: {e}")))
    }

    /// Encodes the message as a length-delimited record.
    #[must_use]
    pub fn encode_wire(&self) -> Vec<u8> {
        self.encode_length_delimited_to_vec()
    }

    /// Decodes one length-delimited record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is oversized, malformed, or carries an
    /// unknown kind.
    pub fn decode_wire(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() > MAX_WIRE_MESSAGE_SIZE {
            return Err(ProtoError::TooLarge {
                size: bytes.len(),
                max: MAX_WIRE_MESSAGE_SIZE,
            });
        }

        let message = Self::decode_length_delimited(bytes)
            .map_err(|e| ProtoError::Decoding(format!("gossip message: {e}")))?;
        message.message_kind()?;
        Ok(message)
    }
}

impl fmt::Display for GossipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GossipMessage(id={}, kind={}, from={}, ttl={}, {} bytes)",
            self.id(),
            self.kind,
            self.from,
            self.ttl,
            self.payload.len()
        )
    }
}
