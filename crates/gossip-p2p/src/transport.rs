//! Delivery of gossip messages to peer addresses.
//!
//! Every message travels over its own TCP connection: connect, write one
//! length-delimited record, close.

use crate::error::P2pError;
use gossip_proto::{GossipMessage, MAX_WIRE_MESSAGE_SIZE, ProtoError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Boxed future type for transport methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default bound on reading one inbound message.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends gossip messages to peers.
pub trait Transport: Send + Sync + 'static {
    /// Delivers `msg` to the peer listening on `addr`.
    fn send<'a>(&'a self, addr: &'a str, msg: GossipMessage) -> BoxFuture<'a, Result<(), P2pError>>;
}

/// TCP transport opening a fresh connection per message.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl TcpTransport {
    /// Creates a transport with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    async fn deliver(&self, addr: &str, msg: GossipMessage) -> Result<(), P2pError> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| P2pError::Timeout {
                addr: addr.to_string(),
                operation: "connect",
            })?
            .map_err(|source| P2pError::Connection {
                addr: addr.to_string(),
                source,
            })?;

        let bytes = msg.encode_wire();
        let write = async {
            stream.write_all(&bytes).await?;
            stream.shutdown().await
        };
        timeout(self.write_timeout, write)
            .await
            .map_err(|_| P2pError::Timeout {
                addr: addr.to_string(),
                operation: "write",
            })?
            .map_err(|source| P2pError::Connection {
                addr: addr.to_string(),
                source,
            })
    }
}

impl Transport for TcpTransport {
    fn send<'a>(&'a self, addr: &'a str, msg: GossipMessage) -> BoxFuture<'a, Result<(), P2pError>> {
        Box::pin(self.deliver(addr, msg))
    }
}

/// Reads and decodes the single message sent on an inbound connection.
///
/// # Errors
///
/// Returns an error on timeout, IO failure, an oversized record or malformed
/// wire data.
pub async fn read_message<R>(reader: &mut R, read_timeout: Duration) -> Result<GossipMessage, P2pError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = MAX_WIRE_MESSAGE_SIZE as u64 + 1;
    timeout(read_timeout, reader.take(limit).read_to_end(&mut buf))
        .await
        .map_err(|_| P2pError::Timeout {
            addr: "inbound".to_string(),
            operation: "read",
        })??;

    if buf.len() > MAX_WIRE_MESSAGE_SIZE {
        return Err(ProtoError::TooLarge {
            size: buf.len(),
            max: MAX_WIRE_MESSAGE_SIZE,
        }
        .into());
    }
    Ok(GossipMessage::decode_wire(&buf)?)
}
