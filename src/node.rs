use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::raft::{LogApplier, LogEntry, RaftNode};
use crate::service::{AuthService, BookingService, SearchService};
use crate::store::MemoryStore;
use crate::twopc::{Coordinator, Participant};

/// Applies committed Raft entries. The booking write path is deliberately
/// outside the replicated log (the coordinator writes after the 2PC
/// decision), so application here is an observability hook.
struct TraceApplier {
    node_id: String,
}

impl LogApplier for TraceApplier {
    fn apply(&self, entry: &LogEntry) -> Result<()> {
        tracing::info!(
            node_id = %self.node_id,
            index = entry.index,
            command = %entry.command,
            "Applying committed entry"
        );
        Ok(())
    }
}

/// Main node that wires the store, domain services, Raft, and the 2PC
/// participant/coordinator together, and runs the two gRPC planes.
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<MemoryStore>,
    pub raft: Arc<RaftNode>,
    pub participant: Arc<Participant>,
    pub coordinator: Arc<Coordinator>,
    pub auth: Arc<AuthService>,
    pub bookings: Arc<BookingService>,
    pub search: Arc<SearchService>,
}

impl Node {
    /// The store is injected: every node of a deployment points at the
    /// same document store, and the test harness shares one across its
    /// in-process cluster.
    pub fn new(config: NodeConfig, store: Arc<MemoryStore>) -> Self {
        let auth = Arc::new(AuthService::new(store.clone(), store.clone()));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        let search = Arc::new(SearchService::new(store.clone(), store.clone()));

        let applier: Arc<dyn LogApplier> = Arc::new(TraceApplier {
            node_id: config.node_id.clone(),
        });
        let raft = Arc::new(RaftNode::new(config.clone(), applier));

        let participant = Arc::new(Participant::new(config.node_id.clone(), bookings.clone()));
        let coordinator = Arc::new(Coordinator::new(
            config.node_id.clone(),
            config.self_client_addr(),
            raft.clone(),
            Duration::from_millis(config.txn_timeout_ms),
        ));

        Self {
            config,
            store,
            raft,
            participant,
            coordinator,
            auth,
            bookings,
            search,
        }
    }

    /// Run the node until the shutdown token fires: seed the bootstrap
    /// admin, spawn the Raft loop and the Raft-plane server, then block on
    /// the client-plane server.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if let (Some(email), Some(password)) =
            (&self.config.admin_email, &self.config.admin_password)
        {
            if let Err(e) = self.auth.seed_admin(email, password) {
                tracing::warn!(error = %e, "Admin seed failed");
            }
        }

        let raft = self.raft.clone();
        let raft_shutdown = shutdown.clone();
        tokio::spawn(async move {
            raft.run(raft_shutdown).await;
        });

        let server = Arc::new(GrpcServer::new(
            self.config.clone(),
            self.raft.clone(),
            self.participant.clone(),
            self.coordinator.clone(),
            self.auth.clone(),
            self.bookings.clone(),
            self.search.clone(),
        ));

        let raft_plane = server.clone();
        let raft_plane_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = raft_plane.run_raft_plane(raft_plane_shutdown).await {
                tracing::error!(error = %e, "Raft-plane server failed");
            }
        });

        server.run_client_plane(shutdown).await?;
        Ok(())
    }
}
