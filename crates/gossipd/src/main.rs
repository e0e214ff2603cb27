//! gossipd - gossip node daemon
//!
//! Runs a gossip node, or talks to a running node's local API.

use clap::{Parser, Subcommand};
use gossipd::client::{self, Subscription};
use gossipd::{GossipNode, NodeConfig};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gossipd")]
#[command(about = "Peer-to-peer gossip node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, env = "GOSSIPD_CONFIG")]
        config: Option<PathBuf>,

        /// Peer listen address
        #[arg(long, env = "GOSSIPD_P2P_ADDRESS")]
        p2p_address: Option<String>,

        /// Local API listen address
        #[arg(long, env = "GOSSIPD_API_ADDRESS")]
        api_address: Option<String>,

        /// Bootstrap service URL
        #[arg(long, env = "GOSSIPD_BOOTSTRAP_URL")]
        bootstrap_url: Option<String>,

        /// Proof-of-work difficulty (leading zero hex digits)
        #[arg(long, env = "GOSSIPD_DIFFICULTY")]
        difficulty: Option<u8>,

        /// Peers each message is forwarded to
        #[arg(long)]
        fanout: Option<usize>,

        /// Maximum number of known peers
        #[arg(long)]
        degree: Option<usize>,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "gossipd.json")]
        output: PathBuf,
    },

    /// Announce data through a running node
    Announce {
        /// Node API address
        #[arg(long, default_value = "127.0.0.1:7002")]
        api: String,

        /// Datatype of the data
        #[arg(long)]
        datatype: u16,

        /// Hop budget
        #[arg(long, default_value_t = 5)]
        ttl: u8,

        /// Data to announce
        data: String,
    },

    /// Subscribe to a datatype and print notifications
    Notify {
        /// Node API address
        #[arg(long, default_value = "127.0.0.1:7002")]
        api: String,

        /// Datatype to subscribe to
        #[arg(long)]
        datatype: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gossipd=info,gossip_p2p=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            p2p_address,
            api_address,
            bootstrap_url,
            difficulty,
            fanout,
            degree,
        } => {
            let mut node_config = match config {
                Some(path) => {
                    info!(config = %path.display(), "loading config");
                    NodeConfig::load(&path)?
                }
                None => NodeConfig::default(),
            };
            if let Some(addr) = p2p_address {
                node_config.p2p_address = addr;
            }
            if let Some(addr) = api_address {
                node_config.api_address = addr;
            }
            if let Some(url) = bootstrap_url {
                node_config.bootstrap_url = url;
            }
            if let Some(difficulty) = difficulty {
                node_config.difficulty = difficulty;
            }
            if let Some(fanout) = fanout {
                node_config.fanout = fanout;
            }
            if let Some(degree) = degree {
                node_config.degree = degree;
            }
            run_node(node_config).await?;
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }

        Commands::Announce {
            api,
            datatype,
            ttl,
            data,
        } => {
            client::announce(&api, ttl, datatype, data.into_bytes()).await?;
            println!("Announced {datatype} via {api}");
        }

        Commands::Notify { api, datatype } => {
            let mut subscription = Subscription::open(&api, datatype).await?;
            println!("Subscribed to datatype {datatype} via {api}");
            while let Some((message_id, datatype, payload)) = subscription.next_notification().await? {
                println!(
                    "[{message_id}] datatype {datatype}: {}",
                    String::from_utf8_lossy(&payload)
                );
                subscription.validate(message_id, true).await?;
            }
            println!("Connection closed by node");
        }
    }

    Ok(())
}

async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    info!(
        p2p = %config.p2p_address,
        api = %config.api_address,
        bootstrap = %config.bootstrap_url,
        "starting gossipd"
    );

    let node = GossipNode::start(config).await?;
    tokio::signal::ctrl_c().await?;
    node.shutdown().await;
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    let config = NodeConfig::default();
    config.save(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Point bootstrap_url at your bootstrap service, then run:");
    println!("  gossipd run --config {}", output.display());

    Ok(())
}
