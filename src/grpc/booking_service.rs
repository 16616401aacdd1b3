use std::sync::Arc;

use tokio::time::{timeout, Duration};
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::error::RoomlyError;
use crate::proto::booking_service_client::BookingServiceClient;
use crate::proto::booking_service_server::BookingService as BookingServiceGrpc;
use crate::proto::{
    CancelBookingRequest, CancelBookingResponse, CreateBookingRequest, CreateBookingResponse,
    JoinWaitlistRequest, JoinWaitlistResponse,
};
use crate::raft::RaftNode;
use crate::service::{AuthService, BookingOp, BookingService};
use crate::twopc::{Coordinator, TxnPeer};

/// Metadata flag marking a request that was already forwarded once. A
/// non-leader receiving a flagged request answers "not leader" instead of
/// forwarding again, so a leaderless cluster terminates instead of
/// bouncing requests between followers.
const FORWARDED_KEY: &str = "x-roomly-forwarded";

/// Client-plane booking surface: forwards mutating calls to the leader
/// when needed, and on the leader runs admission, the 2PC transaction over
/// self plus peers, and the local write.
pub struct BookingGrpc {
    config: NodeConfig,
    raft: Arc<RaftNode>,
    coordinator: Arc<Coordinator>,
    auth: Arc<AuthService>,
    bookings: Arc<BookingService>,
}

impl BookingGrpc {
    pub fn new(
        config: NodeConfig,
        raft: Arc<RaftNode>,
        coordinator: Arc<Coordinator>,
        auth: Arc<AuthService>,
        bookings: Arc<BookingService>,
    ) -> Self {
        Self {
            config,
            raft,
            coordinator,
            auth,
            bookings,
        }
    }

    /// The 2PC participant set: this node first, then every peer, all
    /// addressed over their client planes.
    fn participants(&self) -> Vec<TxnPeer> {
        let mut list = vec![TxnPeer {
            node_id: self.config.node_id.clone(),
            addr: self.config.self_client_addr(),
        }];
        for peer in &self.config.peers {
            list.push(TxnPeer {
                node_id: peer.node_id.clone(),
                addr: peer.client_addr(),
            });
        }
        list
    }

    // The forwarded call wraps a full 2PC round, so it gets twice the
    // transaction deadline.
    fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.config.txn_timeout_ms * 2)
    }

    async fn create_on_leader(&self, req: CreateBookingRequest) -> CreateBookingResponse {
        let fail = |e: RoomlyError| CreateBookingResponse {
            success: false,
            error: e.to_string(),
            booking_id: String::new(),
        };

        let user = match self.auth.current_user(&req.session_token) {
            Ok(user) => user,
            Err(e) => return fail(e),
        };

        if let Err(e) = self
            .bookings
            .admit_booking(&req.room_id, &req.start, &req.end)
        {
            return fail(e);
        }

        let op = BookingOp::create(&req.room_id, &user.id, &req.start, &req.end);
        let operation = match serde_json::to_string(&op) {
            Ok(json) => json,
            Err(e) => return fail(RoomlyError::Internal(e.to_string())),
        };

        let txn_id = format!("txn-{}", Uuid::new_v4().simple());
        if let Err(e) = self
            .coordinator
            .execute(&txn_id, self.participants(), &operation)
            .await
        {
            return fail(e);
        }

        // the durable write happens after the decision, outside 2PC
        match self
            .bookings
            .create_booking(&req.room_id, &user.id, &req.start, &req.end)
        {
            Ok(booking_id) => CreateBookingResponse {
                success: true,
                error: String::new(),
                booking_id,
            },
            Err(e) => fail(e),
        }
    }

    async fn forward_create(&self, req: CreateBookingRequest) -> CreateBookingResponse {
        for peer in &self.config.peers {
            let addr = peer.client_addr();
            let attempt = timeout(self.forward_timeout(), async {
                let mut client =
                    BookingServiceClient::connect(format!("http://{}", addr)).await?;
                let mut request = Request::new(req.clone());
                request
                    .metadata_mut()
                    .insert(FORWARDED_KEY, MetadataValue::from_static("1"));
                let resp = client.create_booking(request).await?;
                Ok::<_, RoomlyError>(resp.into_inner())
            })
            .await;

            match attempt {
                Ok(Ok(resp)) => return resp,
                Ok(Err(e)) => {
                    tracing::debug!(peer_id = %peer.node_id, error = %e, "Forward attempt failed")
                }
                Err(_) => {
                    tracing::debug!(peer_id = %peer.node_id, "Forward attempt timed out")
                }
            }
        }

        CreateBookingResponse {
            success: false,
            error: RoomlyError::NoLeader.to_string(),
            booking_id: String::new(),
        }
    }

    async fn cancel_on_leader(&self, req: CancelBookingRequest) -> CancelBookingResponse {
        let fail = |e: RoomlyError| CancelBookingResponse {
            success: false,
            error: e.to_string(),
        };

        let user = match self.auth.current_user(&req.session_token) {
            Ok(user) => user,
            Err(e) => return fail(e),
        };

        match self.bookings.cancel_booking(&req.booking_id, &user.id) {
            Ok(()) => CancelBookingResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => fail(e),
        }
    }

    async fn forward_cancel(&self, req: CancelBookingRequest) -> CancelBookingResponse {
        for peer in &self.config.peers {
            let addr = peer.client_addr();
            let attempt = timeout(self.forward_timeout(), async {
                let mut client =
                    BookingServiceClient::connect(format!("http://{}", addr)).await?;
                let mut request = Request::new(req.clone());
                request
                    .metadata_mut()
                    .insert(FORWARDED_KEY, MetadataValue::from_static("1"));
                let resp = client.cancel_booking(request).await?;
                Ok::<_, RoomlyError>(resp.into_inner())
            })
            .await;

            match attempt {
                Ok(Ok(resp)) => return resp,
                Ok(Err(e)) => {
                    tracing::debug!(peer_id = %peer.node_id, error = %e, "Forward attempt failed")
                }
                Err(_) => {
                    tracing::debug!(peer_id = %peer.node_id, "Forward attempt timed out")
                }
            }
        }

        CancelBookingResponse {
            success: false,
            error: RoomlyError::NoLeader.to_string(),
        }
    }

    async fn join_on_leader(&self, req: JoinWaitlistRequest) -> JoinWaitlistResponse {
        let fail = |e: RoomlyError| JoinWaitlistResponse {
            success: false,
            error: e.to_string(),
        };

        let user = match self.auth.current_user(&req.session_token) {
            Ok(user) => user,
            Err(e) => return fail(e),
        };

        match self
            .bookings
            .join_waitlist(&req.room_id, &user.id, &req.start, &req.end)
        {
            Ok(()) => JoinWaitlistResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => fail(e),
        }
    }

    async fn forward_join(&self, req: JoinWaitlistRequest) -> JoinWaitlistResponse {
        for peer in &self.config.peers {
            let addr = peer.client_addr();
            let attempt = timeout(self.forward_timeout(), async {
                let mut client =
                    BookingServiceClient::connect(format!("http://{}", addr)).await?;
                let mut request = Request::new(req.clone());
                request
                    .metadata_mut()
                    .insert(FORWARDED_KEY, MetadataValue::from_static("1"));
                let resp = client.join_waitlist(request).await?;
                Ok::<_, RoomlyError>(resp.into_inner())
            })
            .await;

            match attempt {
                Ok(Ok(resp)) => return resp,
                Ok(Err(e)) => {
                    tracing::debug!(peer_id = %peer.node_id, error = %e, "Forward attempt failed")
                }
                Err(_) => {
                    tracing::debug!(peer_id = %peer.node_id, "Forward attempt timed out")
                }
            }
        }

        JoinWaitlistResponse {
            success: false,
            error: RoomlyError::NoLeader.to_string(),
        }
    }
}

#[tonic::async_trait]
impl BookingServiceGrpc for BookingGrpc {
    async fn create_booking(
        &self,
        request: Request<CreateBookingRequest>,
    ) -> Result<Response<CreateBookingResponse>, Status> {
        let forwarded = request.metadata().contains_key(FORWARDED_KEY);
        let req = request.into_inner();

        if !self.raft.is_leader().await {
            if forwarded {
                return Err(Status::failed_precondition("not leader"));
            }
            return Ok(Response::new(self.forward_create(req).await));
        }

        Ok(Response::new(self.create_on_leader(req).await))
    }

    async fn cancel_booking(
        &self,
        request: Request<CancelBookingRequest>,
    ) -> Result<Response<CancelBookingResponse>, Status> {
        let forwarded = request.metadata().contains_key(FORWARDED_KEY);
        let req = request.into_inner();

        if !self.raft.is_leader().await {
            if forwarded {
                return Err(Status::failed_precondition("not leader"));
            }
            return Ok(Response::new(self.forward_cancel(req).await));
        }

        Ok(Response::new(self.cancel_on_leader(req).await))
    }

    async fn join_waitlist(
        &self,
        request: Request<JoinWaitlistRequest>,
    ) -> Result<Response<JoinWaitlistResponse>, Status> {
        let forwarded = request.metadata().contains_key(FORWARDED_KEY);
        let req = request.into_inner();

        if !self.raft.is_leader().await {
            if forwarded {
                return Err(Status::failed_precondition("not leader"));
            }
            return Ok(Response::new(self.forward_join(req).await));
        }

        Ok(Response::new(self.join_on_leader(req).await))
    }
}
