//! End-to-end flows between real nodes on loopback, with an in-process
//! bootstrap service.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gossip_p2p::PeerView;
use gossipd::client::{self, Subscription};
use gossipd::{GossipNode, NodeConfig, NodeError, NodeHandle};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;

#[derive(Default)]
struct Registry {
    peers: Mutex<Vec<String>>,
}

async fn register(
    State(reg): State<Arc<Registry>>,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    let Some(peer) = form.get("peer") else {
        return StatusCode::BAD_REQUEST;
    };
    let mut peers = reg.peers.lock();
    if !peers.contains(peer) {
        peers.push(peer.clone());
    }
    StatusCode::OK
}

async fn peers(State(reg): State<Arc<Registry>>) -> Json<serde_json::Value> {
    let peers = reg.peers.lock().clone();
    let seeds: Vec<String> = peers.iter().take(1).cloned().collect();
    Json(json!({ "partialPeers": peers, "seedNodes": seeds }))
}

async fn heartbeat(
    State(reg): State<Arc<Registry>>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    match query.get("peer") {
        Some(peer) if reg.peers.lock().contains(peer) => StatusCode::OK,
        _ => StatusCode::BAD_REQUEST,
    }
}

async fn deregister(
    State(reg): State<Arc<Registry>>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    if let Some(peer) = query.get("peer") {
        reg.peers.lock().retain(|p| p != peer);
    }
    StatusCode::OK
}

async fn spawn_registry() -> (String, Arc<Registry>) {
    let registry = Arc::new(Registry::default());
    let app = Router::new()
        .route("/register", post(register))
        .route("/peers", get(peers))
        .route("/heartbeat", get(heartbeat))
        .route("/deregister", post(deregister))
        .with_state(Arc::clone(&registry));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), registry)
}

fn node_config(bootstrap_url: &str) -> NodeConfig {
    NodeConfig {
        p2p_address: "127.0.0.1:0".to_string(),
        api_address: "127.0.0.1:0".to_string(),
        bootstrap_url: bootstrap_url.to_string(),
        difficulty: 2,
        fanout: 3,
        heartbeat_interval_secs: 1,
        peer_list_interval_secs: 3_600,
        ..NodeConfig::default()
    }
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(10), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_until_known(node: &NodeHandle, peer: &str) {
    eventually(|| async { node.engine().peers().contains(peer) }).await;
}

#[tokio::test]
async fn second_node_joins_and_is_learned_by_first() {
    let (url, registry) = spawn_registry().await;
    let a = GossipNode::start(node_config(&url)).await.unwrap();
    let b = GossipNode::start(node_config(&url)).await.unwrap();

    // B bootstraps with A, A learns B from the join flood.
    assert!(b.engine().peers().contains(a.p2p_addr()));
    wait_until_known(&a, b.p2p_addr()).await;

    assert!(!a.engine().peers().contains(a.p2p_addr()));
    assert_eq!(registry.peers.lock().len(), 2);
    assert!(b.engine().peers().seeds_snapshot().contains(&a.p2p_addr().to_string()));
    assert!(a.engine().peers().is_seed_node());

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn announce_is_delivered_to_remote_subscriber() {
    let (url, _registry) = spawn_registry().await;
    let a = GossipNode::start(node_config(&url)).await.unwrap();
    let b = GossipNode::start(node_config(&url)).await.unwrap();
    wait_until_known(&a, b.p2p_addr()).await;

    let mut subscription = Subscription::open(&b.api_addr().to_string(), 7).await.unwrap();
    eventually(|| async { b.engine().interests().has_interest(7) }).await;

    client::announce(&a.api_addr().to_string(), 3, 8, b"ignored".to_vec())
        .await
        .unwrap();
    client::announce(&a.api_addr().to_string(), 3, 7, b"hello".to_vec())
        .await
        .unwrap();

    let (_, datatype, payload) = timeout(Duration::from_secs(10), subscription.next_notification())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(datatype, 7);
    assert_eq!(&payload[..], b"hello");

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn reserved_datatype_announce_is_rejected() {
    let (url, _registry) = spawn_registry().await;
    let a = GossipNode::start(node_config(&url)).await.unwrap();

    let result = client::announce(&a.api_addr().to_string(), 3, 512, Vec::new()).await;
    assert!(matches!(result, Err(NodeError::Rejected(reason)) if reason.contains("reserved")));

    a.shutdown().await;
}

#[tokio::test]
async fn shutdown_floods_leave_and_deregisters() {
    let (url, registry) = spawn_registry().await;
    let a = GossipNode::start(node_config(&url)).await.unwrap();
    let b = GossipNode::start(node_config(&url)).await.unwrap();
    let b_addr = b.p2p_addr().to_string();
    wait_until_known(&a, &b_addr).await;

    b.shutdown().await;

    eventually(|| async { !a.engine().peers().contains(&b_addr) }).await;
    assert!(!registry.peers.lock().contains(&b_addr));

    a.shutdown().await;
}

#[tokio::test]
async fn peer_list_refresh_learns_from_seed() {
    let (url, registry) = spawn_registry().await;
    let seed = GossipNode::start(node_config(&url)).await.unwrap();

    // A peer the seed knows about but that never announced itself to us.
    seed.engine().peers().add_peer("127.0.0.1:1");

    let late = GossipNode::start(node_config(&url)).await.unwrap();
    assert_eq!(registry.peers.lock().len(), 2);
    assert!(!late.engine().peers().contains("127.0.0.1:1"));

    let asked = late.engine().refresh_from_seed().await.unwrap();
    assert_eq!(asked.as_deref(), Some(seed.p2p_addr()));
    eventually(|| async { late.engine().peers().contains("127.0.0.1:1") }).await;
    assert!(!late.engine().peers().contains(late.p2p_addr()));

    late.shutdown().await;
    seed.shutdown().await;
}

#[test]
fn peer_view_matches_registry_json() {
    let view: PeerView = serde_json::from_value(json!({
        "partialPeers": ["127.0.0.1:7001"],
        "seedNodes": []
    }))
    .unwrap();
    assert_eq!(view.partial_peers, vec!["127.0.0.1:7001".to_string()]);
}
