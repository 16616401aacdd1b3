use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use roomly::config::{parse_peers, NodeConfig};
use roomly::node::Node;
use roomly::shutdown::shutdown_token;
use roomly::store::MemoryStore;

#[derive(Parser, Debug)]
#[command(name = "roomly")]
#[command(about = "A distributed room reservation service with Raft consensus and 2PC bookings")]
struct Args {
    /// Unique identifier for this node
    #[arg(long, env = "NODE_ID", default_value = "node1")]
    node_id: String,

    /// Port of the client-plane gRPC server (auth, booking, search, admin, 2PC)
    #[arg(long, env = "GRPC_PORT", default_value = "50051")]
    grpc_port: u16,

    /// Port of the Raft-plane gRPC server
    #[arg(long, env = "RAFT_PORT", default_value = "50052")]
    raft_port: u16,

    /// Peer Raft endpoints (comma-separated, format: "id:host:port")
    /// Example: "node2:127.0.0.1:50054,node3:127.0.0.1:50056"
    #[arg(long, env = "PEERS", default_value = "")]
    peers: String,

    /// Bootstrap admin email (seeded at startup when both are set)
    #[arg(long, env = "ADMIN_EMAIL")]
    admin_email: Option<String>,

    /// Bootstrap admin password
    #[arg(long, env = "ADMIN_PASSWORD")]
    admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let peers = parse_peers(&args.peers);

    let config = NodeConfig {
        node_id: args.node_id,
        grpc_port: args.grpc_port,
        raft_port: args.raft_port,
        peers,
        admin_email: args.admin_email,
        admin_password: args.admin_password,
        ..Default::default()
    };

    tracing::info!(
        node_id = %config.node_id,
        grpc_port = config.grpc_port,
        raft_port = config.raft_port,
        peers = ?config.peers.iter().map(|p| format!("{}:{}", p.node_id, p.raft_addr)).collect::<Vec<_>>(),
        "Starting roomly node"
    );

    let store = Arc::new(MemoryStore::new());
    let node = Node::new(config, store);
    let shutdown = shutdown_token();
    node.run(shutdown).await?;

    Ok(())
}
