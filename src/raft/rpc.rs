use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, HeartbeatRequest, HeartbeatResponse,
    LogEntry as ProtoLogEntry, RequestVoteRequest, RequestVoteResponse,
};
use crate::raft::state::{LogEntry, RaftRole, RaftState};

/// Handle RequestVote RPC. A vote is granted iff the request term is at
/// least ours, we have not voted for anyone else this term, and the
/// candidate's log is at least as up-to-date as ours.
pub fn handle_request_vote(state: &mut RaftState, req: &RequestVoteRequest) -> RequestVoteResponse {
    if req.term > state.current_term {
        state.become_follower(req.term);
    }

    let vote_granted = if req.term < state.current_term {
        false
    } else if state.voted_for.is_some() && state.voted_for.as_deref() != Some(&req.candidate_id) {
        false
    } else if !state.is_log_up_to_date(req.last_log_index, req.last_log_term) {
        false
    } else {
        state.voted_for = Some(req.candidate_id.clone());
        true
    };

    tracing::debug!(
        candidate = %req.candidate_id,
        term = req.term,
        granted = vote_granted,
        "RequestVote response"
    );

    RequestVoteResponse {
        term: state.current_term,
        vote_granted,
    }
}

/// Handle AppendEntries RPC. Accepts iff our log contains an entry at
/// prev_log_index with prev_log_term; on accept any conflicting suffix is
/// truncated before the new entries are appended.
pub fn handle_append_entries(
    state: &mut RaftState,
    req: &AppendEntriesRequest,
) -> AppendEntriesResponse {
    if req.term > state.current_term {
        state.become_follower(req.term);
    }

    if req.term < state.current_term {
        return AppendEntriesResponse {
            term: state.current_term,
            success: false,
        };
    }

    // Valid AppendEntries from the leader of this term: candidates step
    // down. The vote already cast this term is kept.
    if state.role != RaftRole::Follower {
        state.role = RaftRole::Follower;
    }
    state.leader_id = Some(req.leader_id.clone());

    // Consistency check against the sentinel-based log.
    match state.entry(req.prev_log_index) {
        Some(entry) if entry.term == req.prev_log_term => {}
        _ => {
            return AppendEntriesResponse {
                term: state.current_term,
                success: false,
            };
        }
    }

    for proto in &req.entries {
        match state.entry(proto.index) {
            Some(existing) if existing.term == proto.term => continue,
            Some(_) => {
                state.truncate_from(proto.index);
                state.log.push(proto_to_entry(proto));
            }
            None => state.log.push(proto_to_entry(proto)),
        }
    }

    if req.leader_commit > state.commit_index {
        state.commit_index = req.leader_commit.min(state.last_log_index());
    }

    AppendEntriesResponse {
        term: state.current_term,
        success: true,
    }
}

/// Heartbeat is an empty AppendEntries with zeroed prev/commit fields; it
/// refreshes the leader's authority without touching the log.
pub fn handle_heartbeat(state: &mut RaftState, req: &HeartbeatRequest) -> HeartbeatResponse {
    let resp = handle_append_entries(
        state,
        &AppendEntriesRequest {
            term: req.term,
            leader_id: req.leader_id.clone(),
            prev_log_index: 0,
            prev_log_term: 0,
            entries: Vec::new(),
            leader_commit: 0,
        },
    );
    HeartbeatResponse {
        term: resp.term,
        success: resp.success,
    }
}

pub fn proto_to_entry(proto: &ProtoLogEntry) -> LogEntry {
    LogEntry {
        term: proto.term,
        index: proto.index,
        command: proto.command.clone(),
    }
}

pub fn entry_to_proto(entry: &LogEntry) -> ProtoLogEntry {
    ProtoLogEntry {
        term: entry.term,
        index: entry.index,
        command: entry.command.clone(),
    }
}
