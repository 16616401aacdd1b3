use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::config::NodeConfig;
use crate::grpc::admin_service::AdminGrpc;
use crate::grpc::auth_service::AuthGrpc;
use crate::grpc::booking_service::BookingGrpc;
use crate::grpc::raft_service::RaftGrpc;
use crate::grpc::search_service::SearchGrpc;
use crate::proto::admin_service_server::AdminServiceServer;
use crate::proto::auth_service_server::AuthServiceServer;
use crate::proto::booking_service_server::BookingServiceServer;
use crate::proto::raft_service_server::RaftServiceServer;
use crate::proto::search_service_server::SearchServiceServer;
use crate::proto::two_pc_service_server::TwoPcServiceServer;
use crate::raft::RaftNode;
use crate::service::{AuthService, BookingService, SearchService};
use crate::twopc::service::TwoPcGrpc;
use crate::twopc::{Coordinator, Participant};

/// Assembles the node's two gRPC planes: the Raft plane on `raft_port` and
/// the client plane (auth, booking, search, admin, 2PC) on `grpc_port`.
pub struct GrpcServer {
    config: NodeConfig,
    raft: Arc<RaftNode>,
    participant: Arc<Participant>,
    coordinator: Arc<Coordinator>,
    auth: Arc<AuthService>,
    bookings: Arc<BookingService>,
    search: Arc<SearchService>,
}

impl GrpcServer {
    pub fn new(
        config: NodeConfig,
        raft: Arc<RaftNode>,
        participant: Arc<Participant>,
        coordinator: Arc<Coordinator>,
        auth: Arc<AuthService>,
        bookings: Arc<BookingService>,
        search: Arc<SearchService>,
    ) -> Self {
        Self {
            config,
            raft,
            participant,
            coordinator,
            auth,
            bookings,
            search,
        }
    }

    pub async fn run_raft_plane(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), tonic::transport::Error> {
        let addr = self.config.raft_listen_addr();
        tracing::info!(addr = %addr, "Starting Raft-plane gRPC server");

        Server::builder()
            .add_service(RaftServiceServer::new(RaftGrpc::new(self.raft.clone())))
            .serve_with_shutdown(addr, shutdown.cancelled_owned())
            .await
    }

    pub async fn run_client_plane(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), tonic::transport::Error> {
        let addr = self.config.client_listen_addr();
        tracing::info!(addr = %addr, "Starting client-plane gRPC server");

        Server::builder()
            .add_service(AuthServiceServer::new(AuthGrpc::new(self.auth.clone())))
            .add_service(BookingServiceServer::new(BookingGrpc::new(
                self.config.clone(),
                self.raft.clone(),
                self.coordinator.clone(),
                self.auth.clone(),
                self.bookings.clone(),
            )))
            .add_service(SearchServiceServer::new(SearchGrpc::new(
                self.search.clone(),
                self.auth.clone(),
            )))
            .add_service(AdminServiceServer::new(AdminGrpc::new(
                self.bookings.clone(),
                self.auth.clone(),
            )))
            .add_service(TwoPcServiceServer::new(TwoPcGrpc::new(
                self.participant.clone(),
                self.coordinator.clone(),
            )))
            .serve_with_shutdown(addr, shutdown.cancelled_owned())
            .await
    }
}
