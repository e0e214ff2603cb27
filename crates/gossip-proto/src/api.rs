//! Local application API framing.
//!
//! Every frame starts with a big-endian header `[u16 size][u16 type]`, where
//! `size` counts the whole frame including the header itself.
//!
//! | type | body |
//! |------|------|
//! | 500 Announce | `u8 ttl, u8 reserved, u16 datatype, payload..` |
//! | 501 Notify | `u16 reserved, u16 datatype` |
//! | 502 Notification | `u16 message_id, u16 datatype, payload..` |
//! | 503 Validation | `u16 message_id, u16 reserved` |

use crate::error::ProtoError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Length of the `[size][type]` header.
pub const HEADER_LEN: usize = 4;

/// Largest frame representable by the 16-bit size field.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// API message type codes.
pub mod message_types {
    /// Request to spread data through the network.
    pub const ANNOUNCE: u16 = 500;
    /// Subscription to a datatype.
    pub const NOTIFY: u16 = 501;
    /// Data delivered to a subscriber.
    pub const NOTIFICATION: u16 = 502;
    /// Subscriber verdict on a notification.
    pub const VALIDATION: u16 = 503;
}

/// A frame of the local API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiMessage {
    /// Spread `payload` with the given TTL and datatype.
    Announce {
        /// Hop budget for the resulting gossip message.
        ttl: u8,
        /// Reserved, sent as zero.
        reserved: u8,
        /// Application datatype.
        datatype: u16,
        /// Application data.
        payload: Bytes,
    },
    /// Subscribe the sending connection to a datatype.
    Notify {
        /// Reserved, sent as zero.
        reserved: u16,
        /// Datatype of interest.
        datatype: u16,
    },
    /// Data received from the network for a subscribed datatype.
    Notification {
        /// Identifier of the delivered message.
        message_id: u16,
        /// Datatype of the delivered data.
        datatype: u16,
        /// Application data.
        payload: Bytes,
    },
    /// Verdict about a previously delivered notification.
    Validation {
        /// Identifier of the notification being validated.
        message_id: u16,
        /// Reserved bits.
        reserved: u16,
    },
}

impl ApiMessage {
    /// Returns the type code of this frame.
    #[must_use]
    pub const fn message_type(&self) -> u16 {
        match self {
            Self::Announce { .. } => message_types::ANNOUNCE,
            Self::Notify { .. } => message_types::NOTIFY,
            Self::Notification { .. } => message_types::NOTIFICATION,
            Self::Validation { .. } => message_types::VALIDATION,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Self::Announce { payload, .. } | Self::Notification { payload, .. } => 4 + payload.len(),
            Self::Notify { .. } | Self::Validation { .. } => 4,
        }
    }

    fn decode_body(message_type: u16, mut body: Bytes) -> Result<Self, ProtoError> {
        match message_type {
            message_types::ANNOUNCE => {
                require_len(&body, 4, false)?;
                Ok(Self::Announce {
                    ttl: body.get_u8(),
                    reserved: body.get_u8(),
                    datatype: body.get_u16(),
                    payload: body,
                })
            }
            message_types::NOTIFY => {
                require_len(&body, 4, true)?;
                Ok(Self::Notify {
                    reserved: body.get_u16(),
                    datatype: body.get_u16(),
                })
            }
            message_types::NOTIFICATION => {
                require_len(&body, 4, false)?;
                Ok(Self::Notification {
                    message_id: body.get_u16(),
                    datatype: body.get_u16(),
                    payload: body,
                })
            }
            message_types::VALIDATION => {
                require_len(&body, 4, true)?;
                Ok(Self::Validation {
                    message_id: body.get_u16(),
                    reserved: body.get_u16(),
                })
            }
            other => Err(ProtoError::UnknownMessageType(i64::from(other))),
        }
    }
}

fn require_len(body: &Bytes, len: usize, exact: bool) -> Result<(), ProtoError> {
    if body.len() < len {
        return Err(ProtoError::TooShort(HEADER_LEN + body.len()));
    }
    if exact && body.len() != len {
        return Err(ProtoError::SizeMismatch {
            declared: HEADER_LEN + body.len(),
            expected: HEADER_LEN + len,
        });
    }
    Ok(())
}

/// Codec for [`ApiMessage`] frames over a byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiCodec;

impl ApiCodec {
    /// Creates a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for ApiCodec {
    type Item = ApiMessage;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let size = usize::from(u16::from_be_bytes([src[0], src[1]]));
        if size < HEADER_LEN {
            return Err(ProtoError::TooShort(size));
        }
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(size);
        frame.advance(2);
        let message_type = frame.get_u16();
        ApiMessage::decode_body(message_type, frame.freeze()).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None if buf.len() < HEADER_LEN => Err(ProtoError::TooShort(buf.len())),
            None => Err(ProtoError::SizeMismatch {
                declared: usize::from(u16::from_be_bytes([buf[0], buf[1]])),
                expected: buf.len(),
            }),
        }
    }
}

impl Encoder<ApiMessage> for ApiCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: ApiMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = HEADER_LEN + item.body_len();
        if size > MAX_FRAME_LEN {
            return Err(ProtoError::TooLarge {
                size,
                max: MAX_FRAME_LEN,
            });
        }

        dst.reserve(size);
        dst.put_u16(size as u16);
        dst.put_u16(item.message_type());
        match item {
            ApiMessage::Announce {
                ttl,
                reserved,
                datatype,
                payload,
            } => {
                dst.put_u8(ttl);
                dst.put_u8(reserved);
                dst.put_u16(datatype);
                dst.put_slice(&payload);
            }
            ApiMessage::Notify { reserved, datatype } => {
                dst.put_u16(reserved);
                dst.put_u16(datatype);
            }
            ApiMessage::Notification {
                message_id,
                datatype,
                payload,
            } => {
                dst.put_u16(message_id);
                dst.put_u16(datatype);
                dst.put_slice(&payload);
            }
            ApiMessage::Validation {
                message_id,
                reserved,
            } => {
                dst.put_u16(message_id);
                dst.put_u16(reserved);
            }
        }
        Ok(())
    }
}
