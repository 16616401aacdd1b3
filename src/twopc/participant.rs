use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::proto::{
    AbortRequest, AbortResponse, CommitRequest, CommitResponse, PrepareRequest, PrepareResponse,
};

/// Callbacks a participant runs at each phase. Prepare must only succeed if
/// the node can locally honor the operation; its success is the vote-commit
/// promise. Abort is best-effort cleanup.
pub trait TxnHooks: Send + Sync {
    fn prepare(&self, operation: &str, data: &serde_json::Value) -> Result<()>;
    fn commit(&self, operation: &str, data: &serde_json::Value) -> Result<()>;
    fn abort(&self, operation: &str, data: &serde_json::Value) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Initial,
    Prepared,
    Committed,
    Aborted,
}

#[derive(Debug)]
struct ParticipantTxn {
    state: ParticipantState,
    operation: String,
    data: serde_json::Value,
}

/// The per-node 2PC participant: a table of transactions keyed by txn id,
/// guarded by a table-level read/write lock plus a per-transaction lock so
/// independent transactions proceed concurrently.
pub struct Participant {
    node_id: String,
    txns: RwLock<HashMap<String, Arc<Mutex<ParticipantTxn>>>>,
    hooks: Arc<dyn TxnHooks>,
}

impl Participant {
    pub fn new(node_id: impl Into<String>, hooks: Arc<dyn TxnHooks>) -> Self {
        Self {
            node_id: node_id.into(),
            txns: RwLock::new(HashMap::new()),
            hooks,
        }
    }

    /// Voting phase: vote-request. Decodes the operation payload, runs the
    /// prepare hook, and answers vote-commit or vote-abort.
    pub async fn prepare(&self, req: PrepareRequest) -> PrepareResponse {
        let coordinator = &req.coordinator_id;
        println!(
            "Phase Voting of Node {} receives RPC vote-request from Phase Voting of Node {}",
            self.node_id, coordinator
        );

        let data: serde_json::Value = match serde_json::from_str(&req.operation) {
            Ok(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
            Ok(_) | Err(_) => {
                self.print_vote(coordinator, false);
                return PrepareResponse {
                    can_commit: false,
                    error: "failed to parse operation".to_string(),
                };
            }
        };

        let txn = {
            let mut txns = self.txns.write().await;
            txns.entry(req.txn_id.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(ParticipantTxn {
                        state: ParticipantState::Initial,
                        operation: req.operation.clone(),
                        data: data.clone(),
                    }))
                })
                .clone()
        };

        let mut txn = txn.lock().await;
        if txn.state != ParticipantState::Initial {
            self.print_vote(coordinator, false);
            return PrepareResponse {
                can_commit: false,
                error: format!("transaction {} is not in Initial state", req.txn_id),
            };
        }

        if let Err(e) = self.hooks.prepare(&txn.operation, &txn.data) {
            tracing::warn!(txn_id = %req.txn_id, error = %e, "Prepare failed");
            self.print_vote(coordinator, false);
            return PrepareResponse {
                can_commit: false,
                error: e.to_string(),
            };
        }

        txn.state = ParticipantState::Prepared;
        tracing::info!(txn_id = %req.txn_id, "Prepared transaction");
        self.print_vote(coordinator, true);

        PrepareResponse {
            can_commit: true,
            error: String::new(),
        }
    }

    /// Decision phase: global-commit. Only valid from Prepared; a failing
    /// commit hook leaves the transaction Prepared for the operator to
    /// reconcile rather than silently aborting a voted transaction.
    pub async fn commit(&self, req: CommitRequest) -> CommitResponse {
        println!(
            "Phase Decision of Node {} receives RPC global-commit from Phase Decision of Node {}",
            self.node_id, req.coordinator_id
        );

        let Some(txn) = self.txns.read().await.get(&req.txn_id).cloned() else {
            return CommitResponse {
                success: false,
                error: format!("transaction {} not found", req.txn_id),
            };
        };

        let mut txn = txn.lock().await;
        if txn.state != ParticipantState::Prepared {
            return CommitResponse {
                success: false,
                error: format!("transaction {} is not in Prepared state", req.txn_id),
            };
        }

        if let Err(e) = self.hooks.commit(&txn.operation, &txn.data) {
            tracing::error!(txn_id = %req.txn_id, error = %e, "Commit hook failed");
            return CommitResponse {
                success: false,
                error: e.to_string(),
            };
        }

        txn.state = ParticipantState::Committed;
        tracing::info!(txn_id = %req.txn_id, "Committed transaction");

        CommitResponse {
            success: true,
            error: String::new(),
        }
    }

    /// Decision phase: global-abort. Valid from Initial or Prepared and
    /// idempotent from Aborted; rejected once Committed. The hook result
    /// never blocks the Aborted transition.
    pub async fn abort(&self, req: AbortRequest) -> AbortResponse {
        println!(
            "Phase Decision of Node {} receives RPC global-abort from Phase Decision of Node {}",
            self.node_id, req.coordinator_id
        );

        let Some(txn) = self.txns.read().await.get(&req.txn_id).cloned() else {
            return AbortResponse {
                success: false,
                error: format!("transaction {} not found", req.txn_id),
            };
        };

        let mut txn = txn.lock().await;
        if txn.state == ParticipantState::Committed {
            return AbortResponse {
                success: false,
                error: format!("cannot abort committed transaction {}", req.txn_id),
            };
        }

        if let Err(e) = self.hooks.abort(&txn.operation, &txn.data) {
            tracing::warn!(txn_id = %req.txn_id, error = %e, "Abort hook failed");
        }

        txn.state = ParticipantState::Aborted;
        tracing::info!(txn_id = %req.txn_id, "Aborted transaction");

        AbortResponse {
            success: true,
            error: String::new(),
        }
    }

    pub async fn txn_state(&self, txn_id: &str) -> Option<ParticipantState> {
        let txn = self.txns.read().await.get(txn_id).cloned()?;
        let state = txn.lock().await.state;
        Some(state)
    }

    pub async fn txn_operation(&self, txn_id: &str) -> Option<String> {
        let txn = self.txns.read().await.get(txn_id).cloned()?;
        let operation = txn.lock().await.operation.clone();
        Some(operation)
    }

    fn print_vote(&self, coordinator: &str, commit: bool) {
        let vote = if commit { "vote-commit" } else { "vote-abort" };
        println!(
            "Phase Voting of Node {} sends RPC {} to Phase Voting of Node {}",
            self.node_id, vote, coordinator
        );
    }
}
