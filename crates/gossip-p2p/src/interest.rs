//! Datatype subscriptions held by local API connections.

use gossip_proto::MessageId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

/// Application data delivered to local subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// ID of the gossip message that carried the data.
    pub message_id: MessageId,
    /// Datatype of the data.
    pub datatype: u16,
    /// Application data.
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Subscription {
    datatypes: HashSet<u16>,
    sender: mpsc::Sender<Notification>,
}

/// Subscriptions keyed by the subscribing connection's address.
///
/// Entries live as long as the connection; the API server removes them with
/// [`InterestMap::unsubscribe`] when it closes.
#[derive(Debug, Default)]
pub struct InterestMap {
    inner: RwLock<HashMap<String, Subscription>>,
}

impl InterestMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `conn_addr` to `datatype`.
    ///
    /// A connection that is already subscribed keeps its original sender and
    /// gains the extra datatype.
    pub fn subscribe(&self, conn_addr: &str, datatype: u16, sender: mpsc::Sender<Notification>) {
        self.inner
            .write()
            .entry(conn_addr.to_string())
            .or_insert_with(|| Subscription {
                datatypes: HashSet::new(),
                sender,
            })
            .datatypes
            .insert(datatype);
    }

    /// Drops every subscription of `conn_addr`.
    pub fn unsubscribe(&self, conn_addr: &str) -> bool {
        self.inner.write().remove(conn_addr).is_some()
    }

    /// Returns true if any connection is subscribed to `datatype`.
    #[must_use]
    pub fn has_interest(&self, datatype: u16) -> bool {
        self.inner
            .read()
            .values()
            .any(|sub| sub.datatypes.contains(&datatype))
    }

    /// Returns the senders of every connection subscribed to `datatype`.
    #[must_use]
    pub fn subscribers_for(&self, datatype: u16) -> Vec<mpsc::Sender<Notification>> {
        self.inner
            .read()
            .values()
            .filter(|sub| sub.datatypes.contains(&datatype))
            .map(|sub| sub.sender.clone())
            .collect()
    }

    /// Returns the number of subscribed connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if no connection is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
