pub mod config;
pub mod error;
pub mod grpc;
pub mod node;
pub mod raft;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod twopc;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("roomly");
}
