//! Node runtime: listeners, background tickers and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gossip_p2p::{
    BootstrapClient, GossipEngine, InterestMap, TcpTransport, apply_peer_view, read_message,
};
use gossip_proto::GossipMessage;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api_server::{ApiBridge, ApiServer, dispatch_notifications};
use crate::config::NodeConfig;
use crate::error::NodeError;

/// Entry point for starting a node.
#[derive(Debug, Clone, Copy, Default)]
pub struct GossipNode;

/// A running node.
#[derive(Debug)]
pub struct NodeHandle {
    engine: Arc<GossipEngine>,
    bootstrap: BootstrapClient,
    api_addr: SocketAddr,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl GossipNode {
    /// Binds the listeners, joins the network and spawns the node's tasks.
    ///
    /// # Errors
    ///
    /// Fails if a listen address cannot be bound or the bootstrap service
    /// cannot be reached for registration and the initial peer view.
    pub async fn start(config: NodeConfig) -> Result<NodeHandle, NodeError> {
        config.validate()?;
        let engine_config = config.engine_config()?;

        let p2p_listener = TcpListener::bind(&config.p2p_address)
            .await
            .map_err(|e| NodeError::BindFailed(config.p2p_address.clone(), e))?;
        let api_listener = TcpListener::bind(&config.api_address)
            .await
            .map_err(|e| NodeError::BindFailed(config.api_address.clone(), e))?;
        let local_addr = advertised_address(&config.p2p_address, p2p_listener.local_addr()?);
        let api_addr = api_listener.local_addr()?;

        let interests = Arc::new(InterestMap::new());
        let (notification_tx, notification_rx) = mpsc::channel(config.notification_queue_size);
        let (announce_tx, announce_rx) = mpsc::channel(config.announce_queue_size);
        let engine = Arc::new(GossipEngine::new(
            local_addr.clone(),
            engine_config,
            Arc::new(TcpTransport::new()),
            Arc::clone(&interests),
            notification_tx,
        ));

        let bootstrap = BootstrapClient::new(config.bootstrap_url.clone())?;
        bootstrap
            .register(&local_addr)
            .await
            .map_err(NodeError::Bootstrap)?;
        let view = bootstrap.fetch_peers().await.map_err(NodeError::Bootstrap)?;
        let added = apply_peer_view(&view, engine.peers());
        info!(
            addr = %local_addr,
            api = %api_addr,
            peers = added,
            seeds = view.seed_nodes.len(),
            "node bootstrapped"
        );
        engine.log_peer_lists();

        let shutdown = CancellationToken::new();
        let bridge = Arc::new(ApiBridge::new(
            local_addr.clone(),
            announce_tx,
            Arc::clone(&interests),
            config.notification_queue_size,
        ));

        let mut tasks = vec![
            tokio::spawn(serve_peers(
                p2p_listener,
                Arc::clone(&engine),
                config.read_timeout(),
                shutdown.clone(),
            )),
            tokio::spawn(ApiServer::serve(api_listener, bridge, shutdown.clone())),
            tokio::spawn(consume_announces(
                announce_rx,
                Arc::clone(&engine),
                shutdown.clone(),
            )),
            tokio::spawn(dispatch_notifications(
                notification_rx,
                interests,
                shutdown.clone(),
            )),
            tokio::spawn(peer_list_ticker(
                Arc::clone(&engine),
                config.peer_list_interval(),
                shutdown.clone(),
            )),
            tokio::spawn(heartbeat_ticker(
                bootstrap.clone(),
                local_addr.clone(),
                config.heartbeat_interval(),
                shutdown.clone(),
            )),
        ];
        if let Some(period) = config.bootstrap_refresh_interval() {
            tasks.push(tokio::spawn(bootstrap_refresh_ticker(
                Arc::clone(&engine),
                bootstrap.clone(),
                period,
                shutdown.clone(),
            )));
        }

        if let Err(e) = engine.announce_join().await {
            warn!(error = %e, "failed to announce join");
        }

        Ok(NodeHandle {
            engine,
            bootstrap,
            api_addr,
            shutdown,
            tasks,
        })
    }
}

impl NodeHandle {
    /// Returns the address announced to peers.
    #[must_use]
    pub fn p2p_addr(&self) -> &str {
        self.engine.local_addr()
    }

    /// Returns the bound API address.
    #[must_use]
    pub const fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    /// Returns the node's engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<GossipEngine> {
        &self.engine
    }

    /// Stops every task, floods a leave announcement and deregisters.
    ///
    /// Leave and deregistration are best effort; failures are logged.
    pub async fn shutdown(self) {
        info!(addr = %self.p2p_addr(), "shutting down");
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "node task failed");
            }
        }

        if let Err(e) = self.engine.announce_leave().await {
            warn!(error = %e, "failed to announce leave");
        }
        if let Err(e) = self.bootstrap.deregister(self.engine.local_addr()).await {
            warn!(error = %e, "failed to deregister");
        }
    }
}

/// Address announced to the network: the configured one, or the bound one
/// when the configuration asked for an ephemeral port.
fn advertised_address(configured: &str, bound: SocketAddr) -> String {
    if configured.ends_with(":0") {
        bound.to_string()
    } else {
        configured.to_string()
    }
}

async fn serve_peers(
    listener: TcpListener,
    engine: Arc<GossipEngine>,
    read_timeout: Duration,
    shutdown: CancellationToken,
) {
    info!(addr = %engine.local_addr(), "peer listener started");
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, remote)) => {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            match read_message(&mut stream, read_timeout).await {
                                Ok(msg) => {
                                    let outcome = engine.handle_inbound(msg).await;
                                    debug!(remote = %remote, outcome = ?outcome, "handled peer message");
                                }
                                Err(e) => debug!(remote = %remote, error = %e, "discarding peer connection"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept peer connection"),
                }
            }
            () = shutdown.cancelled() => break,
        }
    }
}

async fn consume_announces(
    mut announces: mpsc::Receiver<GossipMessage>,
    engine: Arc<GossipEngine>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            () = shutdown.cancelled() => break,
            msg = announces.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        match engine.originate(msg).await {
            Ok(result) => debug!(
                id = %result.message_id,
                targets = result.target_peers.len(),
                "announced message"
            ),
            Err(e) => warn!(error = %e, "failed to gossip announced message"),
        }
    }
}

async fn peer_list_ticker(engine: Arc<GossipEngine>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.refresh_from_seed().await {
                    warn!(error = %e, "peer list request failed");
                }
            }
            () = shutdown.cancelled() => break,
        }
    }
}

async fn heartbeat_ticker(
    bootstrap: BootstrapClient,
    addr: String,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = bootstrap.heartbeat(&addr).await {
                    warn!(error = %e, "heartbeat failed");
                }
            }
            () = shutdown.cancelled() => break,
        }
    }
}

async fn bootstrap_refresh_ticker(
    engine: Arc<GossipEngine>,
    bootstrap: BootstrapClient,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match bootstrap.fetch_peers().await {
                    Ok(view) => {
                        let added = apply_peer_view(&view, engine.peers());
                        debug!(added, "refreshed peer view from bootstrap service");
                        engine.log_peer_lists();
                    }
                    Err(e) => warn!(error = %e, "bootstrap refresh failed"),
                }
            }
            () = shutdown.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("127.0.0.1:0", "127.0.0.1:45000" ; "ephemeral port uses bound address")]
    #[test_case("localhost:7001", "localhost:7001" ; "configured address kept")]
    #[test_case("10.0.0.5:7001", "10.0.0.5:7001" ; "explicit ip kept")]
    fn advertised_address_selection(configured: &str, expected: &str) {
        let bound: SocketAddr = "127.0.0.1:45000".parse().unwrap();
        assert_eq!(advertised_address(configured, bound), expected);
    }

    #[tokio::test]
    async fn start_fails_when_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = NodeConfig {
            p2p_address: taken.local_addr().unwrap().to_string(),
            api_address: "127.0.0.1:0".to_string(),
            ..NodeConfig::default()
        };
        assert!(matches!(
            GossipNode::start(config).await,
            Err(NodeError::BindFailed(..))
        ));
    }

    #[tokio::test]
    async fn start_fails_without_bootstrap_service() {
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", unused.local_addr().unwrap());
        drop(unused);

        let config = NodeConfig {
            p2p_address: "127.0.0.1:0".to_string(),
            api_address: "127.0.0.1:0".to_string(),
            bootstrap_url: url,
            ..NodeConfig::default()
        };
        assert!(matches!(
            GossipNode::start(config).await,
            Err(NodeError::Bootstrap(_))
        ));
    }
}
