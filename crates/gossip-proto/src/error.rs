//! Error types for gossip-proto.

use thiserror::Error;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a message.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a message.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Unknown or out-of-range message type.
    #[error("unknown message type {0}")]
    UnknownMessageType(i64),

    /// Frame is shorter than its fixed fields require.
    #[error("message too short: {0} bytes")]
    TooShort(usize),

    /// Declared frame size disagrees with the bytes present.
    #[error("wrong message size: declared {declared}, expected {expected}")]
    SizeMismatch {
        /// Size carried in the header.
        declared: usize,
        /// Size the frame actually has.
        expected: usize,
    },

    /// Frame or record exceeds the allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the offending message.
        size: usize,
        /// Maximum size accepted.
        max: usize,
    },

    /// IO error surfaced through a codec.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
