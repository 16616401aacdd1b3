use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoomlyError {
    #[error("not leader, current leader is {0:?}")]
    NotLeader(Option<String>),

    #[error("no leader available")]
    NoLeader,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unauthorized: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction state: {0}")]
    TxnState(String),

    #[error("rpc timed out: {0}")]
    Timeout(String),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RoomlyError>;
