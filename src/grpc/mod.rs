pub mod admin_service;
pub mod auth_service;
pub mod booking_service;
pub mod raft_service;
pub mod search_service;
pub mod server;

pub use server::GrpcServer;
