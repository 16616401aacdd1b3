use std::time::Duration;

use tokio::time::timeout;
use tonic::transport::Channel;

use crate::error::{Result, RoomlyError};
use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, HeartbeatRequest, HeartbeatResponse,
    RequestVoteRequest, RequestVoteResponse,
};

/// Client for one peer's Raft plane. Connections are created lazily by the
/// node and cached per peer id; every call carries the short Raft deadline
/// and emits the sender-side protocol line.
#[derive(Clone)]
pub struct RaftClient {
    peer_id: String,
    inner: RaftServiceClient<Channel>,
}

impl RaftClient {
    pub async fn connect(peer_id: &str, addr: &str) -> Result<Self> {
        let inner = RaftServiceClient::connect(format!("http://{}", addr)).await?;
        Ok(Self {
            peer_id: peer_id.to_string(),
            inner,
        })
    }

    pub async fn request_vote(
        &mut self,
        from_id: &str,
        req: RequestVoteRequest,
        deadline: Duration,
    ) -> Result<RequestVoteResponse> {
        println!(
            "Node {} sends RPC RequestVote to Node {}",
            from_id, self.peer_id
        );
        match timeout(deadline, self.inner.request_vote(req)).await {
            Ok(Ok(resp)) => Ok(resp.into_inner()),
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(RoomlyError::Timeout(format!(
                "RequestVote to {}",
                self.peer_id
            ))),
        }
    }

    pub async fn append_entries(
        &mut self,
        from_id: &str,
        req: AppendEntriesRequest,
        deadline: Duration,
    ) -> Result<AppendEntriesResponse> {
        println!(
            "Node {} sends RPC AppendEntries to Node {}",
            from_id, self.peer_id
        );
        match timeout(deadline, self.inner.append_entries(req)).await {
            Ok(Ok(resp)) => Ok(resp.into_inner()),
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(RoomlyError::Timeout(format!(
                "AppendEntries to {}",
                self.peer_id
            ))),
        }
    }

    pub async fn heartbeat(
        &mut self,
        from_id: &str,
        req: HeartbeatRequest,
        deadline: Duration,
    ) -> Result<HeartbeatResponse> {
        println!(
            "Node {} sends RPC Heartbeat to Node {}",
            from_id, self.peer_id
        );
        match timeout(deadline, self.inner.heartbeat(req)).await {
            Ok(Ok(resp)) => Ok(resp.into_inner()),
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(RoomlyError::Timeout(format!(
                "Heartbeat to {}",
                self.peer_id
            ))),
        }
    }
}
