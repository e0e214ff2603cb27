//! Known peers, seed nodes and the degree bound.

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Peer addresses known to this node.
///
/// The local address is never a member. Peers are kept in insertion order so
/// that [`PeerSet::enforce_degree_bound`] evicts the oldest entries first.
#[derive(Debug)]
pub struct PeerSet {
    local_addr: String,
    degree: usize,
    inner: RwLock<PeerState>,
}

#[derive(Debug, Default)]
struct PeerState {
    members: HashSet<String>,
    order: VecDeque<String>,
    seeds: Vec<String>,
    is_seed_node: bool,
}

impl PeerState {
    fn insert(&mut self, addr: &str) -> bool {
        if !self.members.insert(addr.to_string()) {
            return false;
        }
        self.order.push_back(addr.to_string());
        true
    }
}

impl PeerSet {
    /// Creates an empty peer set for the node listening on `local_addr`.
    #[must_use]
    pub fn new(local_addr: impl Into<String>, degree: usize) -> Self {
        Self {
            local_addr: local_addr.into(),
            degree,
            inner: RwLock::new(PeerState::default()),
        }
    }

    /// Returns the local address excluded from the set.
    #[must_use]
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Returns the maximum number of peers kept after bounding.
    #[must_use]
    pub const fn degree(&self) -> usize {
        self.degree
    }

    fn admissible(&self, addr: &str) -> bool {
        !addr.is_empty() && addr != self.local_addr
    }

    /// Adds a peer, returning `true` if it was not known before.
    pub fn add_peer(&self, addr: &str) -> bool {
        if !self.admissible(addr) {
            return false;
        }
        self.inner.write().insert(addr)
    }

    /// Removes a peer, returning `true` if it was present.
    pub fn remove_peer(&self, addr: &str) -> bool {
        let mut inner = self.inner.write();
        if !inner.members.remove(addr) {
            return false;
        }
        inner.order.retain(|a| a != addr);
        true
    }

    /// Adds every admissible address, returning how many were new.
    pub fn merge<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.write();
        addresses
            .into_iter()
            .filter(|addr| self.admissible(addr.as_ref()))
            .filter(|addr| inner.insert(addr.as_ref()))
            .count()
    }

    /// Returns true if `addr` is a member.
    #[must_use]
    pub fn contains(&self, addr: &str) -> bool {
        self.inner.read().members.contains(addr)
    }

    /// Returns a point-in-time copy of the members, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.read().order.iter().cloned().collect()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Returns true if no peers are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts the oldest members until at most `degree` remain.
    ///
    /// Returns the evicted addresses.
    pub fn enforce_degree_bound(&self) -> Vec<String> {
        let mut inner = self.inner.write();
        let excess = inner.order.len().saturating_sub(self.degree);
        let evicted: Vec<String> = inner.order.drain(..excess).collect();
        for addr in &evicted {
            inner.members.remove(addr);
        }
        if !evicted.is_empty() {
            debug!(evicted = ?evicted, degree = self.degree, "peer set over degree bound");
        }
        evicted
    }

    /// Replaces the seed-node list, dropping the local address.
    pub fn set_seeds<I, S>(&self, seeds: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seeds = seeds
            .into_iter()
            .map(Into::into)
            .filter(|addr| self.admissible(addr))
            .collect();
        self.inner.write().seeds = seeds;
    }

    /// Returns a copy of the seed-node list.
    #[must_use]
    pub fn seeds_snapshot(&self) -> Vec<String> {
        self.inner.read().seeds.clone()
    }

    /// Picks a random seed node other than this one.
    #[must_use]
    pub fn random_seed(&self) -> Option<String> {
        self.inner.read().seeds.choose(&mut rand::thread_rng()).cloned()
    }

    /// Returns true if the bootstrap service listed this node as a seed.
    #[must_use]
    pub fn is_seed_node(&self) -> bool {
        self.inner.read().is_seed_node
    }

    /// Records whether this node is a seed.
    pub fn set_seed_node(&self, is_seed: bool) {
        self.inner.write().is_seed_node = is_seed;
    }
}
