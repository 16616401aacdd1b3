use std::net::SocketAddr;

/// Per-node configuration. A node serves two gRPC planes: the client plane
/// (auth, booking, search, admin, 2PC) on `grpc_port` and the Raft plane on
/// `raft_port`. Peers are configured by their Raft endpoints; the client
/// endpoint of a peer is derived by the fixed rule that every node's client
/// plane listens one port below its Raft plane (50051/50052 by default).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub grpc_port: u16,
    pub raft_port: u16,
    pub peers: Vec<PeerConfig>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub raft_rpc_timeout_ms: u64,
    pub txn_timeout_ms: u64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub node_id: String,
    // host:port of the peer's Raft plane, supports both IP and hostnames
    pub raft_addr: String,
}

impl PeerConfig {
    /// Client-plane endpoint of this peer, derived from its Raft endpoint.
    pub fn client_addr(&self) -> String {
        derive_client_addr(&self.raft_addr)
    }
}

/// Client plane = Raft plane port - 1. Addresses without a numeric port are
/// returned unchanged.
pub fn derive_client_addr(raft_addr: &str) -> String {
    match raft_addr.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(p) => format!("{}:{}", host, p - 1),
            Err(_) => raft_addr.to_string(),
        },
        None => raft_addr.to_string(),
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_string(),
            grpc_port: 50051,
            raft_port: 50052,
            peers: Vec::new(),
            election_timeout_min_ms: 1500,
            election_timeout_max_ms: 3000,
            heartbeat_interval_ms: 1000,
            raft_rpc_timeout_ms: 100,
            txn_timeout_ms: 2000,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>, grpc_port: u16, raft_port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            grpc_port,
            raft_port,
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, node_id: impl Into<String>, raft_addr: impl Into<String>) -> Self {
        self.peers.push(PeerConfig {
            node_id: node_id.into(),
            raft_addr: raft_addr.into(),
        });
        self
    }

    pub fn client_listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.grpc_port))
    }

    pub fn raft_listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.raft_port))
    }

    /// Loopback address of this node's own client plane, used for the
    /// StartDecision self-RPC and for self-participation in 2PC.
    pub fn self_client_addr(&self) -> String {
        format!("127.0.0.1:{}", self.grpc_port)
    }
}

/// Parse the `PEERS` list: comma-separated `<id>:<host>:<raft-port>` entries.
pub fn parse_peers(peers_str: &str) -> Vec<PeerConfig> {
    if peers_str.is_empty() {
        return Vec::new();
    }

    peers_str
        .split(',')
        .filter_map(|peer| {
            let parts: Vec<&str> = peer.trim().split(':').collect();
            if parts.len() == 3 {
                Some(PeerConfig {
                    node_id: parts[0].to_string(),
                    raft_addr: format!("{}:{}", parts[1], parts[2]),
                })
            } else {
                tracing::warn!(peer, "Invalid peer format, expected id:host:port");
                None
            }
        })
        .collect()
}
