use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::raft_service_server::RaftService;
use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, HeartbeatRequest, HeartbeatResponse,
    RequestVoteRequest, RequestVoteResponse,
};
use crate::raft::RaftNode;

/// gRPC surface of the Raft plane. Each handler emits the receiver-side
/// protocol line before delegating to the node.
pub struct RaftGrpc {
    raft: Arc<RaftNode>,
}

impl RaftGrpc {
    pub fn new(raft: Arc<RaftNode>) -> Self {
        Self { raft }
    }
}

#[tonic::async_trait]
impl RaftService for RaftGrpc {
    async fn request_vote(
        &self,
        request: Request<RequestVoteRequest>,
    ) -> Result<Response<RequestVoteResponse>, Status> {
        let req = request.into_inner();
        println!(
            "Node {} runs RPC RequestVote called by Node {}",
            self.raft.id, req.candidate_id
        );
        Ok(Response::new(self.raft.handle_request_vote(req).await))
    }

    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        let req = request.into_inner();
        println!(
            "Node {} runs RPC AppendEntries called by Node {}",
            self.raft.id, req.leader_id
        );
        Ok(Response::new(self.raft.handle_append_entries(req).await))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        println!(
            "Node {} runs RPC Heartbeat called by Node {}",
            self.raft.id, req.leader_id
        );
        Ok(Response::new(self.raft.handle_heartbeat(req).await))
    }
}
