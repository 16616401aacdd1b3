//! Test harness for multi-node cluster integration tests.
//!
//! Spins up in-process nodes, each with its own Raft timer loop and both
//! gRPC planes, all sharing one in-memory document store (the way a real
//! deployment shares one external store).

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use roomly::config::{NodeConfig, PeerConfig};
use roomly::error::Result as RoomlyResult;
use roomly::grpc::GrpcServer;
use roomly::raft::{LogApplier, LogEntry, RaftNode, RaftRole};
use roomly::service::{AuthService, BookingService, SearchService};
use roomly::store::MemoryStore;
use roomly::twopc::{Coordinator, Participant};

pub const ADMIN_EMAIL: &str = "admin@roomly.io";
pub const ADMIN_PASSWORD: &str = "adminpass123";

/// Records applied commands so tests can assert apply order.
pub struct RecordingApplier {
    pub applied: Arc<StdMutex<Vec<String>>>,
}

impl LogApplier for RecordingApplier {
    fn apply(&self, entry: &LogEntry) -> RoomlyResult<()> {
        self.applied.lock().unwrap().push(entry.command.clone());
        Ok(())
    }
}

/// Test node configuration with shorter timeouts for faster tests.
pub fn test_node_config(index: usize, num_nodes: usize, base_port: u16) -> NodeConfig {
    let peers: Vec<PeerConfig> = (1..=num_nodes)
        .filter(|i| *i != index)
        .map(|i| PeerConfig {
            node_id: format!("node{}", i),
            raft_addr: format!("127.0.0.1:{}", raft_port(base_port, i)),
        })
        .collect();

    NodeConfig {
        node_id: format!("node{}", index),
        grpc_port: grpc_port(base_port, index),
        raft_port: raft_port(base_port, index),
        peers,
        // Shorter timeouts for faster tests
        election_timeout_min_ms: 150,
        election_timeout_max_ms: 300,
        heartbeat_interval_ms: 50,
        raft_rpc_timeout_ms: 100,
        txn_timeout_ms: 2000,
        admin_email: None,
        admin_password: None,
    }
}

fn grpc_port(base_port: u16, index: usize) -> u16 {
    base_port + 2 * (index as u16 - 1)
}

fn raft_port(base_port: u16, index: usize) -> u16 {
    grpc_port(base_port, index) + 1
}

/// Handle to a running test node
pub struct TestNode {
    pub config: NodeConfig,
    pub raft: Arc<RaftNode>,
    pub participant: Arc<Participant>,
    pub coordinator: Arc<Coordinator>,
    pub auth: Arc<AuthService>,
    pub bookings: Arc<BookingService>,
    pub applied: Arc<StdMutex<Vec<String>>>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TestNode {
    pub async fn is_leader(&self) -> bool {
        self.raft.state.read().await.role == RaftRole::Leader
    }

    pub async fn current_term(&self) -> u64 {
        self.raft.state.read().await.current_term
    }

    /// Log length excluding the index-0 sentinel.
    pub async fn log_len(&self) -> usize {
        self.raft.state.read().await.log.len() - 1
    }

    pub async fn commit_index(&self) -> u64 {
        self.raft.state.read().await.commit_index
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.raft.state.read().await.entries_from(1)
    }

    /// Client-plane endpoint URL for gRPC clients in tests.
    pub fn client_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.config.grpc_port)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Test cluster managing multiple nodes over one shared store
pub struct TestCluster {
    pub nodes: HashMap<String, TestNode>,
    pub store: Arc<MemoryStore>,
}

impl TestCluster {
    /// Create and start a cluster with n nodes
    pub async fn new(num_nodes: usize, base_port: u16) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut cluster = Self {
            nodes: HashMap::new(),
            store: store.clone(),
        };

        for i in 1..=num_nodes {
            let config = test_node_config(i, num_nodes, base_port);
            let node = Self::start_node(config, store.clone()).await;
            cluster.nodes.insert(node.config.node_id.clone(), node);
        }

        // Wait briefly for all nodes to start their gRPC servers
        tokio::time::sleep(Duration::from_millis(100)).await;

        cluster
    }

    async fn start_node(config: NodeConfig, store: Arc<MemoryStore>) -> TestNode {
        let applied = Arc::new(StdMutex::new(Vec::new()));
        let applier: Arc<dyn LogApplier> = Arc::new(RecordingApplier {
            applied: applied.clone(),
        });

        let auth = Arc::new(AuthService::new(store.clone(), store.clone()));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        let search = Arc::new(SearchService::new(store.clone(), store.clone()));

        let raft = Arc::new(RaftNode::new(config.clone(), applier));
        let participant = Arc::new(Participant::new(config.node_id.clone(), bookings.clone()));
        let coordinator = Arc::new(Coordinator::new(
            config.node_id.clone(),
            config.self_client_addr(),
            raft.clone(),
            Duration::from_millis(config.txn_timeout_ms),
        ));

        let server = Arc::new(GrpcServer::new(
            config.clone(),
            raft.clone(),
            participant.clone(),
            coordinator.clone(),
            auth.clone(),
            bookings.clone(),
            search.clone(),
        ));

        let shutdown = CancellationToken::new();
        let mut handles = Vec::new();

        let raft_loop = raft.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            raft_loop.run(token).await;
        }));

        let raft_plane = server.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = raft_plane.run_raft_plane(token).await {
                tracing::error!(error = %e, "Raft-plane server failed");
            }
        }));

        let client_plane = server.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = client_plane.run_client_plane(token).await {
                tracing::error!(error = %e, "Client-plane server failed");
            }
        }));

        TestNode {
            config,
            raft,
            participant,
            coordinator,
            auth,
            bookings,
            applied,
            shutdown,
            handles,
        }
    }

    /// Wait for leader election with timeout
    pub async fn wait_for_leader(&self, timeout_duration: Duration) -> Option<String> {
        let elected = wait_for(
            || async { self.get_leader_id().await.is_some() },
            timeout_duration,
            Duration::from_millis(50),
        )
        .await;

        if elected {
            self.get_leader_id().await
        } else {
            None
        }
    }

    pub async fn get_leader_id(&self) -> Option<String> {
        for node in self.nodes.values() {
            if node.is_leader().await {
                return Some(node.config.node_id.clone());
            }
        }
        None
    }

    pub fn get_node(&self, node_id: &str) -> Option<&TestNode> {
        self.nodes.get(node_id)
    }

    pub async fn leader(&self) -> Option<&TestNode> {
        for node in self.nodes.values() {
            if node.is_leader().await {
                return Some(node);
            }
        }
        None
    }

    pub async fn any_follower(&self) -> Option<&TestNode> {
        for node in self.nodes.values() {
            if !node.is_leader().await {
                return Some(node);
            }
        }
        None
    }

    pub async fn count_leaders(&self) -> usize {
        let mut count = 0;
        for node in self.nodes.values() {
            if node.is_leader().await {
                count += 1;
            }
        }
        count
    }

    /// Shutdown a specific node (simulates crash)
    pub fn stop_node(&mut self, node_id: &str) -> bool {
        self.nodes.remove(node_id).is_some()
    }

    /// Wait for a new leader among remaining nodes
    pub async fn wait_for_new_leader(
        &self,
        excluded_node: &str,
        timeout_duration: Duration,
    ) -> Option<String> {
        let elected = wait_for(
            || async {
                matches!(self.get_leader_id().await, Some(id) if id != excluded_node)
            },
            timeout_duration,
            Duration::from_millis(50),
        )
        .await;

        if elected {
            self.get_leader_id().await
        } else {
            None
        }
    }

    /// Wait until every node's log holds at least `min_entries` entries
    pub async fn wait_for_log_len_on_all(
        &self,
        min_entries: usize,
        timeout_duration: Duration,
    ) -> bool {
        wait_for(
            || async {
                for node in self.nodes.values() {
                    if node.log_len().await < min_entries {
                        return false;
                    }
                }
                true
            },
            timeout_duration,
            Duration::from_millis(50),
        )
        .await
    }

    /// Every pair of logs agrees entry-by-entry (log matching)
    pub async fn verify_log_consistency(&self) -> bool {
        let mut logs = Vec::new();
        for node in self.nodes.values() {
            logs.push(node.log_entries().await);
        }
        logs.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Seed the bootstrap admin in the shared store (idempotent).
    pub fn seed_admin(&self) {
        if let Some(node) = self.nodes.values().next() {
            node.auth
                .seed_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
                .expect("admin seed failed");
        }
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(50)).await;
    assert!(result, "{}", message);
}
