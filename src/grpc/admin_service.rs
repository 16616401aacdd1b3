use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::error::{Result as RoomlyResult, RoomlyError};
use crate::proto::admin_service_server::AdminService as AdminServiceGrpc;
use crate::proto::{
    CreateRoomRequest, CreateRoomResponse, ListRoomsRequest, ListRoomsResponse,
    Room as ProtoRoom, SetRoomScheduleRequest, SetRoomScheduleResponse,
};
use crate::service::{AuthService, BookingService};
use crate::store::User;

/// Admin-only room management on the client plane.
pub struct AdminGrpc {
    bookings: Arc<BookingService>,
    auth: Arc<AuthService>,
}

impl AdminGrpc {
    pub fn new(bookings: Arc<BookingService>, auth: Arc<AuthService>) -> Self {
        Self { bookings, auth }
    }

    fn require_admin(&self, token: &str) -> RoomlyResult<User> {
        let user = self.auth.current_user(token)?;
        if !user.is_admin {
            return Err(RoomlyError::Forbidden(
                "admin access required".to_string(),
            ));
        }
        Ok(user)
    }
}

#[tonic::async_trait]
impl AdminServiceGrpc for AdminGrpc {
    async fn create_room(
        &self,
        request: Request<CreateRoomRequest>,
    ) -> Result<Response<CreateRoomResponse>, Status> {
        let req = request.into_inner();
        let resp = match self
            .require_admin(&req.session_token)
            .and_then(|_| self.bookings.create_room(&req.name, req.capacity))
        {
            Ok(room_id) => CreateRoomResponse {
                success: true,
                error: String::new(),
                room_id,
            },
            Err(e) => CreateRoomResponse {
                success: false,
                error: e.to_string(),
                room_id: String::new(),
            },
        };
        Ok(Response::new(resp))
    }

    async fn list_rooms(
        &self,
        request: Request<ListRoomsRequest>,
    ) -> Result<Response<ListRoomsResponse>, Status> {
        let req = request.into_inner();
        let resp = match self
            .require_admin(&req.session_token)
            .and_then(|_| self.bookings.list_rooms())
        {
            Ok(rooms) => ListRoomsResponse {
                success: true,
                error: String::new(),
                rooms: rooms
                    .into_iter()
                    .map(|r| ProtoRoom {
                        id: r.id,
                        name: r.name,
                        capacity: r.capacity,
                    })
                    .collect(),
            },
            Err(e) => ListRoomsResponse {
                success: false,
                error: e.to_string(),
                rooms: Vec::new(),
            },
        };
        Ok(Response::new(resp))
    }

    async fn set_room_schedule(
        &self,
        request: Request<SetRoomScheduleRequest>,
    ) -> Result<Response<SetRoomScheduleResponse>, Status> {
        let req = request.into_inner();
        let resp = match self.require_admin(&req.session_token).and_then(|_| {
            self.bookings
                .set_room_schedule(&req.room_id, &req.start, &req.end, req.is_open)
        }) {
            Ok(()) => SetRoomScheduleResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => SetRoomScheduleResponse {
                success: false,
                error: e.to_string(),
            },
        };
        Ok(Response::new(resp))
    }
}
