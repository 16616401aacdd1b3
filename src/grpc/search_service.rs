use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::search_service_server::SearchService as SearchServiceGrpc;
use crate::proto::{Room as ProtoRoom, SearchRoomsRequest, SearchRoomsResponse};
use crate::service::{AuthService, SearchService};

pub struct SearchGrpc {
    search: Arc<SearchService>,
    auth: Arc<AuthService>,
}

impl SearchGrpc {
    pub fn new(search: Arc<SearchService>, auth: Arc<AuthService>) -> Self {
        Self { search, auth }
    }
}

#[tonic::async_trait]
impl SearchServiceGrpc for SearchGrpc {
    async fn search_rooms(
        &self,
        request: Request<SearchRoomsRequest>,
    ) -> Result<Response<SearchRoomsResponse>, Status> {
        let req = request.into_inner();

        if let Err(e) = self.auth.current_user(&req.session_token) {
            return Ok(Response::new(SearchRoomsResponse {
                success: false,
                error: e.to_string(),
                rooms: Vec::new(),
            }));
        }

        let resp = match self
            .search
            .find_available(req.min_capacity, &req.start, &req.end)
        {
            Ok(rooms) => SearchRoomsResponse {
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
            Err(e) => SearchRoomsResponse {
                success: false,
                error: e.to_string(),
                rooms: Vec::new(),
            },
        };
        Ok(Response::new(resp))
    }
}
