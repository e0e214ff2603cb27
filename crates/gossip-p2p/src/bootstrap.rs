//! HTTP client for the bootstrap registry.
//!
//! The registry tracks live peers through heartbeats and hands out a partial
//! peer list plus the current seed nodes.

use crate::error::P2pError;
use crate::peers::PeerSet;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Peers and seed nodes returned by `GET /peers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    /// Random subset of registered peers.
    #[serde(default)]
    pub partial_peers: Vec<String>,
    /// Current seed nodes.
    #[serde(default)]
    pub seed_nodes: Vec<String>,
}

/// Client for one bootstrap service.
#[derive(Debug, Clone)]
pub struct BootstrapClient {
    base_url: String,
    http: reqwest::Client,
}

impl BootstrapClient {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for the service at `base_url`, e.g. `http://127.0.0.1:8080`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, P2pError> {
        let http = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Returns the service base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Registers `addr` with the service.
    ///
    /// A non-200 answer is logged and tolerated; only transport failures are
    /// errors.
    pub async fn register(&self, addr: &str) -> Result<(), P2pError> {
        let resp = self
            .http
            .post(self.url("/register"))
            .form(&[("peer", addr)])
            .send()
            .await?;
        if resp.status() == StatusCode::OK {
            info!(peer = %addr, "registered with bootstrap service");
        } else {
            warn!(peer = %addr, status = %resp.status(), "bootstrap registration not acknowledged");
        }
        Ok(())
    }

    /// Fetches a partial peer list and the seed nodes.
    pub async fn fetch_peers(&self) -> Result<PeerView, P2pError> {
        let resp = self.http.get(self.url("/peers")).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(P2pError::Bootstrap(format!(
                "GET /peers returned {}",
                resp.status()
            )));
        }
        let view: PeerView = resp.json().await?;
        debug!(
            peers = view.partial_peers.len(),
            seeds = view.seed_nodes.len(),
            "fetched peer view"
        );
        Ok(view)
    }

    /// Reports `addr` as alive.
    ///
    /// A `localhost` host is sent as `127.0.0.1`, the form the registry keys on.
    pub async fn heartbeat(&self, addr: &str) -> Result<(), P2pError> {
        let addr = heartbeat_address(addr);
        let resp = self
            .http
            .get(self.url("/heartbeat"))
            .query(&[("peer", addr.as_str())])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(P2pError::Bootstrap(format!(
                "heartbeat for {addr} returned {}",
                resp.status()
            )));
        }
        debug!(peer = %addr, "heartbeat acknowledged");
        Ok(())
    }

    /// Removes `addr` from the registry.
    pub async fn deregister(&self, addr: &str) -> Result<(), P2pError> {
        let resp = self
            .http
            .post(self.url("/deregister"))
            .query(&[("peer", addr)])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(P2pError::Bootstrap(format!(
                "deregister for {addr} returned {}",
                resp.status()
            )));
        }
        info!(peer = %addr, "deregistered from bootstrap service");
        Ok(())
    }
}

fn heartbeat_address(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some(("localhost", port)) => format!("127.0.0.1:{port}"),
        _ => addr.to_string(),
    }
}

/// Installs a fetched view into `peers`.
///
/// Partial peers are merged, the seed list replaced and the node's own seed
/// status decided by membership. Returns the number of new peers.
pub fn apply_peer_view(view: &PeerView, peers: &PeerSet) -> usize {
    let is_seed = view.seed_nodes.iter().any(|s| s == peers.local_addr());
    peers.set_seed_node(is_seed);
    peers.set_seeds(view.seed_nodes.iter().cloned());
    let added = peers.merge(&view.partial_peers);
    peers.enforce_degree_bound();
    if is_seed {
        info!("this node is a seed node");
    }
    added
}
