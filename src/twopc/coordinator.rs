use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration, Instant};

use crate::error::{Result, RoomlyError};
use crate::proto::two_pc_service_client::TwoPcServiceClient;
use crate::proto::{
    AbortRequest, CommitRequest, PrepareRequest, StartDecisionRequest, StartDecisionResponse,
    TxnParticipant,
};
use crate::raft::RaftNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Initial,
    Voting,
    Committed,
    Aborted,
}

/// A transaction participant as the coordinator addresses it: node id plus
/// client-plane endpoint. The list always includes the coordinator's own
/// node, reached over loopback like any other participant.
#[derive(Debug, Clone)]
pub struct TxnPeer {
    pub node_id: String,
    pub addr: String,
}

#[derive(Debug)]
struct CoordinatorTxn {
    state: TxnState,
    participants: Vec<TxnPeer>,
    operation: String,
    #[allow(dead_code)]
    started_at: Instant,
}

/// The 2PC coordinator, split into a Voting phase and a Decision phase that
/// talk through a real StartDecision RPC against this node's own client
/// plane. The handoff is never short-circuited: it is the observable phase
/// boundary, and the natural place a durable decision log would hang off.
pub struct Coordinator {
    node_id: String,
    self_client_addr: String,
    raft: Arc<RaftNode>,
    txns: RwLock<HashMap<String, Arc<Mutex<CoordinatorTxn>>>>,
    txn_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        node_id: impl Into<String>,
        self_client_addr: impl Into<String>,
        raft: Arc<RaftNode>,
        txn_timeout: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            self_client_addr: self_client_addr.into(),
            raft,
            txns: RwLock::new(HashMap::new()),
            txn_timeout,
        }
    }

    /// Register a new transaction. Only the Raft leader may coordinate;
    /// duplicate transaction ids are rejected.
    pub async fn start_transaction(
        &self,
        txn_id: &str,
        participants: Vec<TxnPeer>,
        operation: &str,
    ) -> Result<()> {
        if !self.raft.is_leader().await {
            return Err(RoomlyError::NotLeader(self.raft.leader_id().await));
        }

        let mut txns = self.txns.write().await;
        if txns.contains_key(txn_id) {
            return Err(RoomlyError::Conflict(format!(
                "transaction {} already exists",
                txn_id
            )));
        }

        let count = participants.len();
        txns.insert(
            txn_id.to_string(),
            Arc::new(Mutex::new(CoordinatorTxn {
                state: TxnState::Initial,
                participants,
                operation: operation.to_string(),
                started_at: Instant::now(),
            })),
        );

        tracing::info!(txn_id, participants = count, "Started transaction");
        Ok(())
    }

    /// Drive a transaction through both phases. The Decision phase is always
    /// reached, even when voting fails, so the protocol terminates cleanly
    /// on every participant.
    pub async fn execute(
        &self,
        txn_id: &str,
        participants: Vec<TxnPeer>,
        operation: &str,
    ) -> Result<()> {
        self.start_transaction(txn_id, participants, operation)
            .await?;

        let (all_voted_commit, failure) = self.voting_phase(txn_id).await?;
        self.send_start_decision(txn_id, all_voted_commit).await?;

        if !all_voted_commit {
            return Err(RoomlyError::TxnState(format!(
                "prepare phase failed: {}",
                failure.unwrap_or_else(|| "a participant voted abort".to_string())
            )));
        }
        Ok(())
    }

    /// Voting phase: fan out vote-request to every participant in parallel
    /// and aggregate the votes. An RPC error counts as an abort vote.
    async fn voting_phase(&self, txn_id: &str) -> Result<(bool, Option<String>)> {
        let txn = self.txn(txn_id).await?;
        let (participants, operation) = {
            let mut txn = txn.lock().await;
            if txn.state != TxnState::Initial {
                return Err(RoomlyError::TxnState(format!(
                    "transaction {} is not in Initial state",
                    txn_id
                )));
            }
            txn.state = TxnState::Voting;
            (txn.participants.clone(), txn.operation.clone())
        };

        tracing::info!(txn_id, "Starting voting phase");

        let wire_participants: Vec<TxnParticipant> = participants
            .iter()
            .map(|p| TxnParticipant {
                node_id: p.node_id.clone(),
                address: p.addr.clone(),
            })
            .collect();

        let mut pending = JoinSet::new();
        for peer in participants {
            let req = PrepareRequest {
                txn_id: txn_id.to_string(),
                coordinator_id: self.node_id.clone(),
                participants: wire_participants.clone(),
                operation: operation.clone(),
            };
            let node_id = self.node_id.clone();
            let deadline = self.txn_timeout;
            pending.spawn(async move { send_prepare(&node_id, &peer, req, deadline).await });
        }

        let mut all_voted_commit = true;
        let mut failure = None;
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(Ok(resp)) if resp.can_commit => {}
                Ok(Ok(resp)) => {
                    all_voted_commit = false;
                    failure.get_or_insert(resp.error);
                }
                Ok(Err(e)) => {
                    all_voted_commit = false;
                    failure.get_or_insert(e.to_string());
                }
                Err(e) => {
                    all_voted_commit = false;
                    failure.get_or_insert(e.to_string());
                }
            }
        }

        if all_voted_commit {
            tracing::info!(txn_id, "All participants voted commit");
        } else {
            tracing::warn!(txn_id, reason = ?failure, "Voting phase failed");
        }
        Ok((all_voted_commit, failure))
    }

    /// The handoff from Voting to Decision: a StartDecision RPC against
    /// this node's own client plane.
    async fn send_start_decision(&self, txn_id: &str, all_voted_commit: bool) -> Result<()> {
        println!(
            "Phase Voting of Node {} sends RPC StartDecision to Phase Decision of Node {}",
            self.node_id, self.node_id
        );

        let req = StartDecisionRequest {
            txn_id: txn_id.to_string(),
            all_voted_commit,
        };
        let resp = timeout(self.txn_timeout, async {
            let mut client =
                TwoPcServiceClient::connect(format!("http://{}", self.self_client_addr)).await?;
            let resp = client.start_decision(req).await?;
            Ok::<_, RoomlyError>(resp.into_inner())
        })
        .await
        .map_err(|_| RoomlyError::Timeout("StartDecision".to_string()))??;

        if !resp.success {
            return Err(RoomlyError::TxnState(format!(
                "decision phase failed: {}",
                resp.error
            )));
        }
        Ok(())
    }

    /// Decision phase entry point, reached only through the StartDecision
    /// RPC issued by the Voting phase.
    pub async fn start_decision(&self, req: StartDecisionRequest) -> StartDecisionResponse {
        println!(
            "Phase Decision of Node {} runs RPC StartDecision called by Phase Voting of Node {}",
            self.node_id, self.node_id
        );

        if self.txn(&req.txn_id).await.is_err() {
            return StartDecisionResponse {
                success: false,
                error: format!("transaction {} not found", req.txn_id),
            };
        }

        let outcome = if req.all_voted_commit {
            self.commit_phase(&req.txn_id).await
        } else {
            self.abort_phase(&req.txn_id).await
        };

        match outcome {
            Ok(()) => StartDecisionResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => StartDecisionResponse {
                success: false,
                error: e.to_string(),
            },
        }
    }

    /// Decision: global-commit to every participant. Individual commit
    /// errors are logged but do not revert the decision.
    async fn commit_phase(&self, txn_id: &str) -> Result<()> {
        let txn = self.txn(txn_id).await?;
        let participants = {
            let mut txn = txn.lock().await;
            if txn.state != TxnState::Voting {
                return Err(RoomlyError::TxnState(format!(
                    "transaction {} is not in Voting state",
                    txn_id
                )));
            }
            txn.state = TxnState::Committed;
            txn.participants.clone()
        };

        tracing::info!(txn_id, "Starting commit phase");
        self.fan_out_decision(txn_id, participants, true).await;
        tracing::info!(txn_id, "Commit phase completed");
        Ok(())
    }

    /// Decision: global-abort. Rejected once the transaction committed.
    async fn abort_phase(&self, txn_id: &str) -> Result<()> {
        let txn = self.txn(txn_id).await?;
        let participants = {
            let mut txn = txn.lock().await;
            if txn.state == TxnState::Committed {
                return Err(RoomlyError::TxnState(format!(
                    "cannot abort committed transaction {}",
                    txn_id
                )));
            }
            txn.state = TxnState::Aborted;
            txn.participants.clone()
        };

        tracing::info!(txn_id, "Starting abort phase");
        self.fan_out_decision(txn_id, participants, false).await;
        tracing::info!(txn_id, "Abort phase completed");
        Ok(())
    }

    async fn fan_out_decision(&self, txn_id: &str, participants: Vec<TxnPeer>, commit: bool) {
        let mut pending = JoinSet::new();
        for peer in participants {
            let txn_id = txn_id.to_string();
            let node_id = self.node_id.clone();
            let deadline = self.txn_timeout;
            pending.spawn(async move {
                let result = if commit {
                    send_commit(&node_id, &peer, &txn_id, deadline).await
                } else {
                    send_abort(&node_id, &peer, &txn_id, deadline).await
                };
                (peer.node_id, result)
            });
        }

        while let Some(joined) = pending.join_next().await {
            if let Ok((peer_id, Err(e))) = joined {
                tracing::warn!(txn_id, peer_id = %peer_id, error = %e, "Decision delivery failed");
            }
        }
    }

    pub async fn txn_state(&self, txn_id: &str) -> Option<TxnState> {
        let txn = self.txns.read().await.get(txn_id).cloned()?;
        let state = txn.lock().await.state;
        Some(state)
    }

    async fn txn(&self, txn_id: &str) -> Result<Arc<Mutex<CoordinatorTxn>>> {
        self.txns
            .read()
            .await
            .get(txn_id)
            .cloned()
            .ok_or_else(|| RoomlyError::NotFound(format!("transaction {}", txn_id)))
    }
}

/// Voting phase: vote-request to one participant over a short-lived
/// connection (2PC traffic is coarse enough that pooling buys nothing).
async fn send_prepare(
    from_id: &str,
    peer: &TxnPeer,
    req: PrepareRequest,
    deadline: Duration,
) -> Result<crate::proto::PrepareResponse> {
    println!(
        "Phase Voting of Node {} sends RPC vote-request to Phase Voting of Node {}",
        from_id, peer.node_id
    );

    timeout(deadline, async {
        let mut client = TwoPcServiceClient::connect(format!("http://{}", peer.addr)).await?;
        let resp = client.prepare(req).await?;
        Ok::<_, RoomlyError>(resp.into_inner())
    })
    .await
    .map_err(|_| RoomlyError::Timeout(format!("vote-request to {}", peer.node_id)))?
}

/// Decision phase: global-commit to one participant.
async fn send_commit(
    from_id: &str,
    peer: &TxnPeer,
    txn_id: &str,
    deadline: Duration,
) -> Result<()> {
    println!(
        "Phase Decision of Node {} sends RPC global-commit to Phase Decision of Node {}",
        from_id, peer.node_id
    );

    let resp = timeout(deadline, async {
        let mut client = TwoPcServiceClient::connect(format!("http://{}", peer.addr)).await?;
        let resp = client
            .commit(CommitRequest {
                txn_id: txn_id.to_string(),
                coordinator_id: from_id.to_string(),
            })
            .await?;
        Ok::<_, RoomlyError>(resp.into_inner())
    })
    .await
    .map_err(|_| RoomlyError::Timeout(format!("global-commit to {}", peer.node_id)))??;

    if !resp.success {
        return Err(RoomlyError::TxnState(resp.error));
    }
    Ok(())
}

/// Decision phase: global-abort to one participant.
async fn send_abort(from_id: &str, peer: &TxnPeer, txn_id: &str, deadline: Duration) -> Result<()> {
    println!(
        "Phase Decision of Node {} sends RPC global-abort to Phase Decision of Node {}",
        from_id, peer.node_id
    );

    let resp = timeout(deadline, async {
        let mut client = TwoPcServiceClient::connect(format!("http://{}", peer.addr)).await?;
        let resp = client
            .abort(AbortRequest {
                txn_id: txn_id.to_string(),
                coordinator_id: from_id.to_string(),
            })
            .await?;
        Ok::<_, RoomlyError>(resp.into_inner())
    })
    .await
    .map_err(|_| RoomlyError::Timeout(format!("global-abort to {}", peer.node_id)))??;

    if !resp.success {
        return Err(RoomlyError::TxnState(resp.error));
    }
    Ok(())
}
