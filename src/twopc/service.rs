use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::two_pc_service_server::TwoPcService;
use crate::proto::{
    AbortRequest, AbortResponse, CommitRequest, CommitResponse, PrepareRequest, PrepareResponse,
    StartDecisionRequest, StartDecisionResponse,
};
use crate::twopc::{Coordinator, Participant};

/// gRPC surface of the 2PC plane: participant RPCs plus the coordinator's
/// StartDecision phase boundary, served on the client plane.
pub struct TwoPcGrpc {
    participant: Arc<Participant>,
    coordinator: Arc<Coordinator>,
}

impl TwoPcGrpc {
    pub fn new(participant: Arc<Participant>, coordinator: Arc<Coordinator>) -> Self {
        Self {
            participant,
            coordinator,
        }
    }
}

#[tonic::async_trait]
impl TwoPcService for TwoPcGrpc {
    async fn prepare(
        &self,
        request: Request<PrepareRequest>,
    ) -> Result<Response<PrepareResponse>, Status> {
        Ok(Response::new(
            self.participant.prepare(request.into_inner()).await,
        ))
    }

    async fn commit(
        &self,
        request: Request<CommitRequest>,
    ) -> Result<Response<CommitResponse>, Status> {
        Ok(Response::new(
            self.participant.commit(request.into_inner()).await,
        ))
    }

    async fn abort(
        &self,
        request: Request<AbortRequest>,
    ) -> Result<Response<AbortResponse>, Status> {
        Ok(Response::new(
            self.participant.abort(request.into_inner()).await,
        ))
    }

    async fn start_decision(
        &self,
        request: Request<StartDecisionRequest>,
    ) -> Result<Response<StartDecisionResponse>, Status> {
        Ok(Response::new(
            self.coordinator.start_decision(request.into_inner()).await,
        ))
    }
}
