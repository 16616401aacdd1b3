pub mod coordinator;
pub mod participant;
pub mod service;

pub use coordinator::{Coordinator, TxnPeer, TxnState};
pub use participant::{Participant, ParticipantState, TxnHooks};
