//! Peer discovery sub-protocol.
//!
//! Join and leave announcements are flooded like any other message. Peer-list
//! requests and responses are unicast with a TTL of one, and
//! [`GossipEngine::handle_inbound`] never relays them whatever TTL they carry.

use crate::engine::{BroadcastResult, GossipEngine};
use crate::error::P2pError;
use crate::pow::{self, Difficulty};
use crate::transport::Transport;
use gossip_proto::GossipMessage;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl GossipEngine {
    /// Floods a join announcement for this node at the configured TTL.
    pub async fn announce_join(&self) -> Result<BroadcastResult, P2pError> {
        let msg = GossipMessage::peer_join(&self.local_addr, self.config.join_ttl);
        info!(addr = %self.local_addr, ttl = msg.ttl, "announcing join");
        self.originate(msg).await
    }

    /// Floods a leave announcement for this node at the configured TTL.
    pub async fn announce_leave(&self) -> Result<BroadcastResult, P2pError> {
        let msg = GossipMessage::peer_leave(&self.local_addr, self.config.join_ttl);
        info!(addr = %self.local_addr, ttl = msg.ttl, "announcing leave");
        self.originate(msg).await
    }

    /// Asks `seed` for its peer list.
    pub async fn request_peer_list(&self, seed: &str) -> Result<(), P2pError> {
        let msg = GossipMessage::peer_list_request(self.local_addr.clone());
        self.cache().check_and_insert(msg.id());
        debug!(seed, "requesting peer list");
        unicast(Arc::clone(&self.transport), self.config.difficulty, seed, msg).await
    }

    /// Requests a peer list from a random seed node.
    ///
    /// Returns the seed that was asked, or `None` if no seed is known.
    pub async fn refresh_from_seed(&self) -> Result<Option<String>, P2pError> {
        let Some(seed) = self.peers.random_seed() else {
            info!("no seed nodes available");
            return Ok(None);
        };
        self.request_peer_list(&seed).await?;
        Ok(Some(seed))
    }

    /// Logs the current peers and seeds at debug level.
    pub fn log_peer_lists(&self) {
        debug!(
            peers = ?self.peers.snapshot(),
            seeds = ?self.peers.seeds_snapshot(),
            is_seed = self.peers.is_seed_node(),
            "peer lists"
        );
    }

    pub(crate) fn on_peer_join(&self, msg: &GossipMessage) {
        let addr = match msg.payload_address() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(from = %msg.from, error = %e, "ignoring malformed join announcement");
                return;
            }
        };
        if addr == self.local_addr {
            return;
        }
        if self.peers.add_peer(&addr) {
            info!(peer = %addr, "peer joined");
        }
        self.peers.enforce_degree_bound();
    }

    pub(crate) fn on_peer_leave(&self, msg: &GossipMessage) {
        match msg.payload_address() {
            Ok(addr) => {
                if self.peers.remove_peer(&addr) {
                    info!(peer = %addr, "peer left");
                }
            }
            Err(e) => warn!(from = %msg.from, error = %e, "ignoring malformed leave announcement"),
        }
    }

    pub(crate) fn on_peer_list_request(&self, msg: &GossipMessage) {
        let requester = msg.from.clone();
        if requester.is_empty() || requester == self.local_addr {
            return;
        }

        let response =
            match GossipMessage::peer_list_response(self.local_addr.clone(), &self.peers.snapshot()) {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "failed to build peer list response");
                    return;
                }
            };
        self.cache().check_and_insert(response.id());

        let transport = Arc::clone(&self.transport);
        let difficulty = self.config.difficulty;
        tokio::spawn(async move {
            if let Err(e) = unicast(transport, difficulty, &requester, response).await {
                warn!(peer = %requester, error = %e, "failed to send peer list");
            }
        });
    }

    pub(crate) fn on_peer_list_response(&self, msg: &GossipMessage) {
        match msg.peer_addresses() {
            Ok(addresses) => {
                let added = self.peers.merge(&addresses);
                self.peers.enforce_degree_bound();
                debug!(from = %msg.from, received = addresses.len(), added, "merged peer list");
                self.log_peer_lists();
            }
            Err(e) => warn!(from = %msg.from, error = %e, "ignoring malformed peer list"),
        }
    }
}

async fn unicast(
    transport: Arc<dyn Transport>,
    difficulty: Difficulty,
    addr: &str,
    msg: GossipMessage,
) -> Result<(), P2pError> {
    let msg = pow::stamp_blocking(msg, difficulty).await?;
    transport.send(addr, msg).await
}
