use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::auth_service_server::AuthService as AuthServiceGrpc;
use crate::proto::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, MeRequest, MeResponse,
    RegisterRequest, RegisterResponse,
};
use crate::service::AuthService;

/// Client-plane auth surface. Domain failures become success=false
/// envelopes; the transport layer only sees healthy responses.
pub struct AuthGrpc {
    auth: Arc<AuthService>,
}

impl AuthGrpc {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

#[tonic::async_trait]
impl AuthServiceGrpc for AuthGrpc {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        let resp = match self.auth.register(&req.email, &req.password) {
            Ok(()) => RegisterResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => RegisterResponse {
                success: false,
                error: e.to_string(),
            },
        };
        Ok(Response::new(resp))
    }

    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();
        let resp = match self.auth.login(&req.email, &req.password) {
            Ok((session_token, expires_at)) => LoginResponse {
                success: true,
                error: String::new(),
                session_token,
                expires_at,
            },
            Err(e) => LoginResponse {
                success: false,
                error: e.to_string(),
                session_token: String::new(),
                expires_at: String::new(),
            },
        };
        Ok(Response::new(resp))
    }

    async fn logout(
        &self,
        request: Request<LogoutRequest>,
    ) -> Result<Response<LogoutResponse>, Status> {
        let req = request.into_inner();
        let resp = match self.auth.logout(&req.session_token) {
            Ok(()) => LogoutResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => LogoutResponse {
                success: false,
                error: e.to_string(),
            },
        };
        Ok(Response::new(resp))
    }

    async fn me(&self, request: Request<MeRequest>) -> Result<Response<MeResponse>, Status> {
        let req = request.into_inner();
        let resp = match self.auth.current_user(&req.session_token) {
            Ok(user) => MeResponse {
                success: true,
                error: String::new(),
                user_id: user.id,
                email: user.email,
                is_admin: user.is_admin,
            },
            Err(e) => MeResponse {
                success: false,
                error: e.to_string(),
                user_id: String::new(),
                email: String::new(),
                is_admin: false,
            },
        };
        Ok(Response::new(resp))
    }
}
