//! Local application API.
//!
//! Applications connect over TCP and speak [`ApiMessage`] frames. An
//! `Announce` is queued for the engine and the connection closed. A `Notify`
//! keeps the connection open and streams matching notifications until the
//! client goes away, at which point its subscription is dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use gossip_p2p::{InterestMap, Notification};
use gossip_proto::{ApiCodec, ApiMessage, GossipMessage, MessageKind};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reply written when the announce queue cannot take another message.
pub const NO_RECEIVER: &str = "no receiver available";

/// Shared state the API server hands requests to.
#[derive(Debug)]
pub struct ApiBridge {
    node_addr: String,
    announce_tx: mpsc::Sender<GossipMessage>,
    interests: Arc<InterestMap>,
    notification_queue_size: usize,
}

impl ApiBridge {
    /// Creates a bridge for the node announced as `node_addr`.
    #[must_use]
    pub fn new(
        node_addr: impl Into<String>,
        announce_tx: mpsc::Sender<GossipMessage>,
        interests: Arc<InterestMap>,
        notification_queue_size: usize,
    ) -> Self {
        Self {
            node_addr: node_addr.into(),
            announce_tx,
            interests,
            notification_queue_size: notification_queue_size.max(1),
        }
    }

    fn announce(&self, ttl: u8, datatype: u16, payload: Bytes) -> Result<(), String> {
        if MessageKind::is_reserved_datatype(datatype) {
            return Err(format!("datatype {datatype} is reserved"));
        }
        let msg = GossipMessage::data(self.node_addr.clone(), datatype, payload.to_vec(), i32::from(ttl));
        debug!(id = %msg.id(), datatype, ttl, "queueing announce");
        self.announce_tx
            .try_send(msg)
            .map_err(|_| NO_RECEIVER.to_string())
    }
}

/// What the connection loop does after a frame.
enum Next {
    Continue,
    Close,
    Reply(String),
}

/// Subscription state of one API connection.
struct ClientSubscription {
    tx: mpsc::Sender<Notification>,
    rx: mpsc::Receiver<Notification>,
}

/// Accept loop for local API connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiServer;

impl ApiServer {
    /// Serves API connections on `listener` until `shutdown` is cancelled.
    pub async fn serve(listener: TcpListener, bridge: Arc<ApiBridge>, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "API server listening");
        }

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let bridge = Arc::clone(&bridge);
                            let shutdown = shutdown.clone();
                            tokio::spawn(handle_connection(stream, peer_addr, bridge, shutdown));
                        }
                        Err(e) => warn!(error = %e, "failed to accept API connection"),
                    }
                }
                () = shutdown.cancelled() => {
                    debug!("API server stopping");
                    break;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: Arc<ApiBridge>,
    shutdown: CancellationToken,
) {
    let conn = peer_addr.to_string();
    debug!(client = %conn, "API connection opened");

    let mut framed = Framed::new(stream, ApiCodec::new());
    let mut subscription: Option<ClientSubscription> = None;

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => Next::Close,
            Some(note) = next_notification(&mut subscription) => {
                let frame = ApiMessage::Notification {
                    message_id: note.message_id.notification_id(),
                    datatype: note.datatype,
                    payload: Bytes::from(note.payload),
                };
                match framed.send(frame).await {
                    Ok(()) => Next::Continue,
                    Err(e) => {
                        debug!(client = %conn, error = %e, "failed to deliver notification");
                        Next::Close
                    }
                }
            }
            frame = framed.next() => match frame {
                None => Next::Close,
                Some(Err(e)) => Next::Reply(e.to_string()),
                Some(Ok(msg)) => handle_frame(&bridge, &conn, msg, &mut subscription),
            },
        };

        match next {
            Next::Continue => {}
            Next::Close => break,
            Next::Reply(text) => {
                warn!(client = %conn, reply = %text, "rejecting API request");
                let stream = framed.get_mut();
                if let Err(e) = stream.write_all(format!("{text}\n").as_bytes()).await {
                    debug!(client = %conn, error = %e, "failed to write API error");
                }
                break;
            }
        }
    }

    if subscription.is_some() {
        bridge.interests.unsubscribe(&conn);
        debug!(client = %conn, "subscription removed");
    }
    let _ = framed.get_mut().shutdown().await;
    debug!(client = %conn, "API connection closed");
}

fn handle_frame(
    bridge: &ApiBridge,
    conn: &str,
    msg: ApiMessage,
    subscription: &mut Option<ClientSubscription>,
) -> Next {
    match msg {
        ApiMessage::Announce {
            ttl,
            datatype,
            payload,
            ..
        } => match bridge.announce(ttl, datatype, payload) {
            Ok(()) => Next::Close,
            Err(reason) => Next::Reply(reason),
        },
        ApiMessage::Notify { datatype, .. } => {
            if MessageKind::is_reserved_datatype(datatype) {
                return Next::Reply(format!("datatype {datatype} is reserved"));
            }
            let sub = subscription.get_or_insert_with(|| {
                let (tx, rx) = mpsc::channel(bridge.notification_queue_size);
                ClientSubscription { tx, rx }
            });
            bridge.interests.subscribe(conn, datatype, sub.tx.clone());
            info!(client = %conn, datatype, "client subscribed");
            Next::Continue
        }
        ApiMessage::Validation {
            message_id,
            reserved,
        } => {
            debug!(client = %conn, message_id, valid = (reserved & 1) == 1, "validation received");
            Next::Continue
        }
        ApiMessage::Notification { .. } => {
            Next::Reply("notification is a server-to-client message".to_string())
        }
    }
}

async fn next_notification(subscription: &mut Option<ClientSubscription>) -> Option<Notification> {
    match subscription {
        Some(sub) => sub.rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Forwards engine notifications to every subscribed connection.
///
/// A subscriber whose queue is full misses the notification rather than
/// stalling delivery to the others.
pub async fn dispatch_notifications(
    mut notifications: mpsc::Receiver<Notification>,
    interests: Arc<InterestMap>,
    shutdown: CancellationToken,
) {
    loop {
        let note = tokio::select! {
            () = shutdown.cancelled() => break,
            note = notifications.recv() => match note {
                Some(note) => note,
                None => break,
            },
        };

        for sender in interests.subscribers_for(note.datatype) {
            if sender.try_send(note.clone()).is_err() {
                warn!(id = %note.message_id, datatype = note.datatype, "subscriber queue full, dropping notification");
            }
        }
    }
    debug!("notification dispatcher stopped");
}
