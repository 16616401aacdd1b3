pub mod client;
pub mod node;
pub mod rpc;
pub mod state;
pub mod timer;

pub use node::RaftNode;
pub use state::{LogApplier, LogEntry, RaftRole, RaftState};
