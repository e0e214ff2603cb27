//! Client side of the local API, used by the `announce` and `notify`
//! subcommands.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use gossip_proto::{ApiCodec, ApiMessage};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::NodeError;

/// How long to wait for the server to close an announce connection.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Announces `payload` through the node API at `api_addr`.
///
/// # Errors
///
/// Returns [`NodeError::Rejected`] with the server's reply if the announce was
/// refused, or an IO/protocol error if the exchange failed.
pub async fn announce(api_addr: &str, ttl: u8, datatype: u16, payload: Vec<u8>) -> Result<(), NodeError> {
    let mut framed = Framed::new(TcpStream::connect(api_addr).await?, ApiCodec::new());
    framed
        .send(ApiMessage::Announce {
            ttl,
            reserved: 0,
            datatype,
            payload: Bytes::from(payload),
        })
        .await?;

    let mut stream = framed.into_inner();
    let mut reply = String::new();
    // The server closes silently on success and writes a reason otherwise.
    if let Ok(read) = tokio::time::timeout(REPLY_TIMEOUT, stream.read_to_string(&mut reply)).await {
        read?;
    }
    let reply = reply.trim();
    if reply.is_empty() {
        Ok(())
    } else {
        Err(NodeError::Rejected(reply.to_string()))
    }
}

/// An open subscription on the node API.
#[derive(Debug)]
pub struct Subscription {
    framed: Framed<TcpStream, ApiCodec>,
}

impl Subscription {
    /// Subscribes to `datatype` at `api_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the subscribe frame fails.
    pub async fn open(api_addr: &str, datatype: u16) -> Result<Self, NodeError> {
        let mut framed = Framed::new(TcpStream::connect(api_addr).await?, ApiCodec::new());
        framed
            .send(ApiMessage::Notify {
                reserved: 0,
                datatype,
            })
            .await?;
        Ok(Self { framed })
    }

    /// Adds another datatype to this subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be sent.
    pub async fn add_datatype(&mut self, datatype: u16) -> Result<(), NodeError> {
        self.framed
            .send(ApiMessage::Notify {
                reserved: 0,
                datatype,
            })
            .await?;
        Ok(())
    }

    /// Waits for the next notification. Returns `None` once the node closes
    /// the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server sends a malformed or unexpected frame.
    pub async fn next_notification(&mut self) -> Result<Option<(u16, u16, Bytes)>, NodeError> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(ApiMessage::Notification {
                message_id,
                datatype,
                payload,
            })) => Ok(Some((message_id, datatype, payload))),
            Some(Ok(other)) => Err(NodeError::Rejected(format!(
                "unexpected frame type {}",
                other.message_type()
            ))),
        }
    }

    /// Reports a verdict on a received notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be sent.
    pub async fn validate(&mut self, message_id: u16, valid: bool) -> Result<(), NodeError> {
        self.framed
            .send(ApiMessage::Validation {
                message_id,
                reserved: u16::from(valid),
            })
            .await?;
        Ok(())
    }
}
