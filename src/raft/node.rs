use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{NodeConfig, PeerConfig};
use crate::error::{Result, RoomlyError};
use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, HeartbeatRequest, HeartbeatResponse,
    RequestVoteRequest, RequestVoteResponse,
};
use crate::raft::client::RaftClient;
use crate::raft::rpc;
use crate::raft::state::{LogApplier, RaftRole, RaftState};
use crate::raft::timer::random_election_timeout;

/// The Raft node: follower/candidate/leader state machine with the election
/// and heartbeat timers, vote and replication fan-out, and the cached peer
/// clients. Peer connections are created lazily on first use and dropped
/// when the node stops.
pub struct RaftNode {
    pub id: String,
    pub state: Arc<RwLock<RaftState>>,
    config: NodeConfig,
    clients: Arc<Mutex<HashMap<String, RaftClient>>>,
    last_heartbeat: Arc<RwLock<Instant>>,
    applier: Arc<dyn LogApplier>,
}

impl RaftNode {
    pub fn new(config: NodeConfig, applier: Arc<dyn LogApplier>) -> Self {
        Self {
            id: config.node_id.clone(),
            state: Arc::new(RwLock::new(RaftState::new())),
            config,
            clients: Arc::new(Mutex::new(HashMap::new())),
            last_heartbeat: Arc::new(RwLock::new(Instant::now())),
            applier,
        }
    }

    fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.config.raft_rpc_timeout_ms)
    }

    /// Strict majority of the configured node set (peers plus self).
    fn majority(&self) -> usize {
        (self.config.peers.len() + 1) / 2 + 1
    }

    /// Run the Raft timer loop until shutdown: election timeouts for
    /// followers and candidates, heartbeat ticks for leaders.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut election_timeout = random_election_timeout(
            self.config.election_timeout_min_ms,
            self.config.election_timeout_max_ms,
        );

        loop {
            let role = self.state.read().await.role;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.close_clients().await;
                    tracing::info!(node_id = %self.id, "Raft node stopped");
                    return;
                }

                // Election timeout (for followers and candidates)
                _ = tokio::time::sleep(election_timeout), if role != RaftRole::Leader => {
                    let elapsed = self.last_heartbeat.read().await.elapsed();
                    if elapsed >= election_timeout {
                        tracing::info!(
                            node_id = %self.id,
                            elapsed_ms = elapsed.as_millis(),
                            "Election timeout, starting election"
                        );
                        self.clone().start_election().await;
                    }
                    election_timeout = random_election_timeout(
                        self.config.election_timeout_min_ms,
                        self.config.election_timeout_max_ms,
                    );
                }

                // Heartbeat interval (for leaders)
                _ = tokio::time::sleep(Duration::from_millis(self.config.heartbeat_interval_ms)), if role == RaftRole::Leader => {
                    self.clone().broadcast_heartbeats().await;
                }
            }
        }
    }

    /// Start a new election: bump the term, vote for ourselves, and request
    /// votes from every peer in parallel.
    async fn start_election(self: Arc<Self>) {
        let (term, last_log_index, last_log_term) = {
            let mut state = self.state.write().await;
            state.become_candidate(&self.id);
            (
                state.current_term,
                state.last_log_index(),
                state.last_log_term(),
            )
        };

        tracing::info!(node_id = %self.id, term, "Starting election");

        let req = RequestVoteRequest {
            term,
            candidate_id: self.id.clone(),
            last_log_index,
            last_log_term,
        };

        let mut pending = JoinSet::new();
        for peer in self.config.peers.clone() {
            let node = self.clone();
            let req = req.clone();
            pending.spawn(async move {
                let mut client = match node.get_client(&peer).await {
                    Ok(client) => client,
                    Err(e) => {
                        tracing::warn!(peer_id = %peer.node_id, error = %e, "Peer unreachable");
                        return None;
                    }
                };
                match client.request_vote(&node.id, req, node.rpc_timeout()).await {
                    Ok(resp) => Some(resp),
                    Err(e) => {
                        tracing::warn!(peer_id = %peer.node_id, error = %e, "Vote request failed");
                        None
                    }
                }
            });
        }

        let mut votes: usize = 1; // vote for self
        let mut max_seen_term = term;
        while let Some(joined) = pending.join_next().await {
            if let Ok(Some(resp)) = joined {
                if resp.term > max_seen_term {
                    max_seen_term = resp.term;
                }
                if resp.vote_granted {
                    votes += 1;
                }
            }
        }

        if max_seen_term > term {
            self.state.write().await.become_follower(max_seen_term);
            return;
        }

        let won = {
            let mut state = self.state.write().await;
            if state.role == RaftRole::Candidate
                && state.current_term == term
                && votes >= self.majority()
            {
                let peer_ids: Vec<String> =
                    self.config.peers.iter().map(|p| p.node_id.clone()).collect();
                state.become_leader(&self.id, &peer_ids);
                true
            } else {
                false
            }
        };

        if won {
            tracing::info!(node_id = %self.id, term, votes, "Became leader");
            self.clone().broadcast_heartbeats().await;
        } else {
            tracing::debug!(node_id = %self.id, term, votes, "Election not won");
        }
    }

    /// Send a heartbeat to every follower, and kick replication for any
    /// peer whose log is behind.
    async fn broadcast_heartbeats(self: Arc<Self>) {
        let (term, lagging) = {
            let state = self.state.read().await;
            if state.role != RaftRole::Leader {
                return;
            }
            let last = state.last_log_index();
            let lagging: Vec<PeerConfig> = self
                .config
                .peers
                .iter()
                .filter(|p| state.next_index.get(&p.node_id).copied().unwrap_or(1) <= last)
                .cloned()
                .collect();
            (state.current_term, lagging)
        };

        for peer in self.config.peers.clone() {
            let node = self.clone();
            tokio::spawn(async move {
                let mut client = match node.get_client(&peer).await {
                    Ok(client) => client,
                    Err(_) => return,
                };
                let req = HeartbeatRequest {
                    term,
                    leader_id: node.id.clone(),
                };
                match client.heartbeat(&node.id, req, node.rpc_timeout()).await {
                    Ok(resp) => {
                        if resp.term > term {
                            let mut state = node.state.write().await;
                            if resp.term > state.current_term {
                                state.become_follower(resp.term);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::trace!(peer_id = %peer.node_id, error = %e, "Heartbeat failed")
                    }
                }
            });
        }

        for peer in lagging {
            let node = self.clone();
            tokio::spawn(async move {
                node.replicate_to_peer(peer).await;
            });
        }
    }

    /// Append a command to the log (leader only) and replicate it to all
    /// peers. Returns the index assigned to the entry.
    pub async fn append_command(self: Arc<Self>, command: String) -> Result<u64> {
        let index = {
            let mut state = self.state.write().await;
            if state.role != RaftRole::Leader {
                return Err(RoomlyError::NotLeader(state.leader_id.clone()));
            }
            let index = state.append(command);
            // a single-node cluster commits immediately
            advance_leader_commit(&mut state, self.majority());
            apply_committed(&mut state, &*self.applier, &self.id);
            index
        };

        tracing::debug!(node_id = %self.id, index, "Appended command to log");
        self.clone().replicate_all().await;
        Ok(index)
    }

    async fn replicate_all(self: Arc<Self>) {
        for peer in self.config.peers.clone() {
            let node = self.clone();
            tokio::spawn(async move {
                node.replicate_to_peer(peer).await;
            });
        }
    }

    /// Ship entries from the peer's next-index. On a consistency rejection
    /// the next-index backs off by one and the call is retried; on success
    /// the match-index advances and the commit index is re-evaluated.
    async fn replicate_to_peer(self: Arc<Self>, peer: PeerConfig) {
        loop {
            let (term, prev_log_index, prev_log_term, entries, leader_commit) = {
                let state = self.state.read().await;
                if state.role != RaftRole::Leader {
                    return;
                }
                let next = state.next_index.get(&peer.node_id).copied().unwrap_or(1);
                if next > state.last_log_index() {
                    return;
                }
                let prev = next - 1;
                let prev_term = state.entry(prev).map(|e| e.term).unwrap_or(0);
                let entries: Vec<_> = state
                    .entries_from(next)
                    .iter()
                    .map(rpc::entry_to_proto)
                    .collect();
                (state.current_term, prev, prev_term, entries, state.commit_index)
            };

            let sent_last = prev_log_index + entries.len() as u64;
            let mut client = match self.get_client(&peer).await {
                Ok(client) => client,
                Err(e) => {
                    tracing::trace!(peer_id = %peer.node_id, error = %e, "Peer unreachable");
                    return;
                }
            };

            let req = AppendEntriesRequest {
                term,
                leader_id: self.id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            };

            match client.append_entries(&self.id, req, self.rpc_timeout()).await {
                Ok(resp) => {
                    let mut state = self.state.write().await;
                    if resp.term > state.current_term {
                        state.become_follower(resp.term);
                        return;
                    }
                    if state.role != RaftRole::Leader {
                        return;
                    }
                    if resp.success {
                        state.match_index.insert(peer.node_id.clone(), sent_last);
                        state.next_index.insert(peer.node_id.clone(), sent_last + 1);
                        advance_leader_commit(&mut state, self.majority());
                        apply_committed(&mut state, &*self.applier, &self.id);
                        return;
                    }
                    // consistency check failed: back off and retry
                    let next = state.next_index.get(&peer.node_id).copied().unwrap_or(1);
                    if next <= 1 {
                        return;
                    }
                    state.next_index.insert(peer.node_id.clone(), next - 1);
                }
                Err(e) => {
                    tracing::trace!(peer_id = %peer.node_id, error = %e, "AppendEntries failed");
                    return;
                }
            }
        }
    }

    /// Handle incoming RequestVote RPC
    pub async fn handle_request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse {
        let resp = {
            let mut state = self.state.write().await;
            rpc::handle_request_vote(&mut state, &req)
        };

        // granting a vote defers our own candidacy
        if resp.vote_granted {
            *self.last_heartbeat.write().await = Instant::now();
        }
        resp
    }

    /// Handle incoming AppendEntries RPC
    pub async fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let resp = {
            let mut state = self.state.write().await;
            let resp = rpc::handle_append_entries(&mut state, &req);
            if resp.success {
                apply_committed(&mut state, &*self.applier, &self.id);
            }
            resp
        };

        if resp.success {
            *self.last_heartbeat.write().await = Instant::now();
        }
        resp
    }

    /// Handle incoming Heartbeat RPC
    pub async fn handle_heartbeat(&self, req: HeartbeatRequest) -> HeartbeatResponse {
        let resp = {
            let mut state = self.state.write().await;
            rpc::handle_heartbeat(&mut state, &req)
        };

        if resp.success {
            *self.last_heartbeat.write().await = Instant::now();
        }
        resp
    }

    /// Get or lazily create the cached client for a peer.
    async fn get_client(&self, peer: &PeerConfig) -> Result<RaftClient> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&peer.node_id) {
            return Ok(client.clone());
        }
        let client = RaftClient::connect(&peer.node_id, &peer.raft_addr).await?;
        clients.insert(peer.node_id.clone(), client.clone());
        Ok(client)
    }

    async fn close_clients(&self) {
        self.clients.lock().await.clear();
    }

    pub async fn is_leader(&self) -> bool {
        self.state.read().await.role == RaftRole::Leader
    }

    pub async fn current_term(&self) -> u64 {
        self.state.read().await.current_term
    }

    /// The leader this node believes in: itself when leading, otherwise
    /// whoever sent the last valid AppendEntries.
    pub async fn leader_id(&self) -> Option<String> {
        let state = self.state.read().await;
        if state.role == RaftRole::Leader {
            Some(self.id.clone())
        } else {
            state.leader_id.clone()
        }
    }
}

/// Advance the leader's commit index to the largest N replicated on a
/// majority with log[N].term == current_term.
fn advance_leader_commit(state: &mut RaftState, majority: usize) {
    let mut n = state.last_log_index();
    while n > state.commit_index {
        let replicated = 1 + state.match_index.values().filter(|&&m| m >= n).count();
        if replicated >= majority && state.entry(n).map(|e| e.term) == Some(state.current_term) {
            state.commit_index = n;
            tracing::debug!(commit_index = n, "Updated commit index");
            break;
        }
        n -= 1;
    }
}

/// Apply newly committed entries in index order, exactly once.
fn apply_committed(state: &mut RaftState, applier: &dyn LogApplier, node_id: &str) {
    while state.last_applied < state.commit_index {
        state.last_applied += 1;
        if let Some(entry) = state.entry(state.last_applied) {
            if let Err(e) = applier.apply(entry) {
                tracing::error!(
                    node_id = %node_id,
                    index = entry.index,
                    error = %e,
                    "Error applying command"
                );
            }
        }
    }
}
