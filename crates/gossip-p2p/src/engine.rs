//! Fanout flooding and dispatch of inbound gossip messages.

use crate::cache::DuplicateCache;
use crate::error::P2pError;
use crate::interest::{InterestMap, Notification};
use crate::peers::PeerSet;
use crate::pow::{self, Difficulty};
use crate::transport::Transport;
use gossip_proto::{GossipMessage, MessageId, MessageKind};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Configuration for the dissemination engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of peers each message is forwarded to.
    pub fanout: usize,
    /// Maximum number of peers kept in the peer set.
    pub degree: usize,
    /// Number of message IDs remembered for duplicate suppression.
    pub cache_size: usize,
    /// Proof-of-work difficulty for every message.
    pub difficulty: Difficulty,
    /// TTL of join and leave announcements.
    pub join_ttl: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fanout: 2,
            degree: 30,
            cache_size: 1_000,
            difficulty: Difficulty::default(),
            join_ttl: 5,
        }
    }
}

impl EngineConfig {
    /// Sets the fanout.
    #[must_use]
    pub const fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    /// Sets the degree bound.
    #[must_use]
    pub const fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Sets the duplicate cache capacity.
    #[must_use]
    pub const fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Sets the proof-of-work difficulty.
    #[must_use]
    pub const fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Sets the TTL of join and leave announcements.
    #[must_use]
    pub const fn with_join_ttl(mut self, join_ttl: i32) -> Self {
        self.join_ttl = join_ttl;
        self
    }
}

/// Result of a gossip step.
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    /// ID of the gossiped message.
    pub message_id: MessageId,
    /// Peers the message was handed to.
    pub target_peers: Vec<String>,
}

impl BroadcastResult {
    fn empty(message_id: MessageId) -> Self {
        Self {
            message_id,
            target_peers: Vec::new(),
        }
    }

    /// Returns true if no peer was targeted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target_peers.is_empty()
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The proof-of-work stamp did not validate; dropped.
    InvalidStamp,
    /// The kind discriminant is not known; dropped.
    Malformed,
    /// The message ID was already processed; dropped.
    Duplicate,
    /// Dispatched locally and relayed to the listed peers.
    Processed {
        /// Peers the message was relayed to.
        relayed_to: Vec<String>,
    },
}

/// The dissemination engine of one node.
///
/// Owns the peer set and duplicate cache; shares the interest map with the
/// API server. Every method takes `&self`, so the engine is shared behind an
/// `Arc` between the listener, ticker and API tasks.
pub struct GossipEngine {
    pub(crate) local_addr: String,
    pub(crate) config: EngineConfig,
    pub(crate) peers: PeerSet,
    cache: DuplicateCache,
    interests: Arc<InterestMap>,
    pub(crate) transport: Arc<dyn Transport>,
    notifications: mpsc::Sender<Notification>,
}

impl std::fmt::Debug for GossipEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipEngine")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .field("peers", &self.peers.len())
            .field("cached_ids", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl GossipEngine {
    /// Creates an engine for the node listening on `local_addr`.
    ///
    /// Notifications for subscribed datatypes are pushed onto `notifications`.
    #[must_use]
    pub fn new(
        local_addr: impl Into<String>,
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        interests: Arc<InterestMap>,
        notifications: mpsc::Sender<Notification>,
    ) -> Self {
        let local_addr = local_addr.into();
        Self {
            peers: PeerSet::new(local_addr.clone(), config.degree),
            cache: DuplicateCache::new(config.cache_size),
            local_addr,
            config,
            interests,
            transport,
            notifications,
        }
    }

    /// Returns the local peer address.
    #[must_use]
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the peer set.
    #[must_use]
    pub const fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Returns the duplicate cache.
    #[must_use]
    pub const fn cache(&self) -> &DuplicateCache {
        &self.cache
    }

    /// Returns the shared interest map.
    #[must_use]
    pub fn interests(&self) -> &Arc<InterestMap> {
        &self.interests
    }

    /// Injects a message created on this node.
    ///
    /// The ID is cached first so the node never reprocesses its own flood.
    pub async fn originate(&self, msg: GossipMessage) -> Result<BroadcastResult, P2pError> {
        self.cache.check_and_insert(msg.id());
        self.gossip(msg).await
    }

    /// Stamps `msg` and hands it to a random subset of at most `fanout` peers.
    ///
    /// Messages with `ttl < 1` are dropped without being sent. Each send runs
    /// in its own task; failures are logged and never retried.
    pub async fn gossip(&self, mut msg: GossipMessage) -> Result<BroadcastResult, P2pError> {
        let message_id = msg.id();
        if msg.ttl < 1 {
            trace!(id = %message_id, "ttl exhausted, not gossiping");
            return Ok(BroadcastResult::empty(message_id));
        }

        msg.from.clone_from(&self.local_addr);
        let msg = pow::stamp_blocking(msg, self.config.difficulty).await?;

        let mut targets = self.peers.snapshot();
        targets.shuffle(&mut rand::thread_rng());
        targets.truncate(self.config.fanout);

        for target in &targets {
            self.spawn_send(target.clone(), msg.clone());
        }

        debug!(
            id = %message_id,
            kind = msg.kind,
            ttl = msg.ttl,
            targets = targets.len(),
            "gossiped message"
        );
        Ok(BroadcastResult {
            message_id,
            target_peers: targets,
        })
    }

    fn spawn_send(&self, addr: String, msg: GossipMessage) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(&addr, msg).await {
                warn!(peer = %addr, error = %e, "failed to send gossip message");
            }
        });
    }

    /// Handles a message received from a peer.
    ///
    /// Messages with an invalid stamp or an ID already cached are dropped.
    /// Anything else is dispatched by kind. Data, join and leave messages then
    /// have their TTL decremented and the flood continued; peer-list messages
    /// are never relayed.
    pub async fn handle_inbound(&self, mut msg: GossipMessage) -> InboundOutcome {
        if !pow::validate(&msg, self.config.difficulty) {
            debug!(id = %msg.id(), from = %msg.from, "dropping message with invalid stamp");
            return InboundOutcome::InvalidStamp;
        }

        let kind = match msg.message_kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(from = %msg.from, error = %e, "dropping message of unknown kind");
                return InboundOutcome::Malformed;
            }
        };

        if !self.cache.check_and_insert(msg.id()) {
            trace!(id = %msg.id(), "duplicate message");
            return InboundOutcome::Duplicate;
        }

        self.dispatch(kind, &msg);

        // Peer-list traffic is point to point whatever ttl it claims.
        if matches!(kind, MessageKind::PeerListRequest | MessageKind::PeerListResponse) {
            return InboundOutcome::Processed {
                relayed_to: Vec::new(),
            };
        }

        msg.ttl = msg.ttl.saturating_sub(1);
        match self.gossip(msg).await {
            Ok(result) => InboundOutcome::Processed {
                relayed_to: result.target_peers,
            },
            Err(e) => {
                warn!(error = %e, "failed to relay message");
                InboundOutcome::Processed {
                    relayed_to: Vec::new(),
                }
            }
        }
    }

    fn dispatch(&self, kind: MessageKind, msg: &GossipMessage) {
        match kind {
            MessageKind::Data(datatype) => self.deliver_local(datatype, msg),
            MessageKind::PeerJoin => self.on_peer_join(msg),
            MessageKind::PeerLeave => self.on_peer_leave(msg),
            MessageKind::PeerListRequest => self.on_peer_list_request(msg),
            MessageKind::PeerListResponse => self.on_peer_list_response(msg),
        }
    }

    /// Queues a notification for the API side. A full queue drops the
    /// delivery instead of stalling the peer connection.
    fn deliver_local(&self, datatype: u16, msg: &GossipMessage) {
        if !self.interests.has_interest(datatype) {
            return;
        }

        let notification = Notification {
            message_id: msg.id(),
            datatype,
            payload: msg.payload.clone(),
        };
        match self.notifications.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(note)) => {
                warn!(id = %note.message_id, datatype, "notification queue full, dropping delivery");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(datatype, "notification channel closed, dropping delivery");
            }
        }
    }
}
