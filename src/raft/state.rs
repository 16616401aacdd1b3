use std::collections::HashMap;

use crate::error::Result;

/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// A single entry in the replicated log. The command is an opaque string;
/// booking operations encode themselves as JSON before appending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub command: String,
}

/// Capability invoked for every committed entry, in index order, exactly
/// once per node.
pub trait LogApplier: Send + Sync {
    fn apply(&self, entry: &LogEntry) -> Result<()>;
}

/// Per-node Raft state.
///
/// # Safety invariants
///
/// - Election safety: one vote per term (`voted_for`), majority required.
/// - Leader append-only: leaders only append entries with their own term;
///   truncation happens on followers during replication conflicts.
/// - Log matching: the AppendEntries consistency check on
///   (prev_log_index, prev_log_term) plus conflict truncation.
/// - Leader completeness: vote restriction on log recency, and the commit
///   index only advances over entries of the current term.
/// - State machine safety: `last_applied <= commit_index <= log length`.
///
/// The log holds a sentinel entry {term 0, index 0} so that `prev_log_*`
/// bounds never need special-casing; real entries start at index 1.
#[derive(Debug)]
pub struct RaftState {
    // Persistent state (in-memory in this design; lost on restart)
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub log: Vec<LogEntry>,

    // Volatile state on all servers
    pub commit_index: u64,
    pub last_applied: u64,

    // Volatile state on leaders (reinitialized after election)
    pub next_index: HashMap<String, u64>,
    pub match_index: HashMap<String, u64>,

    pub role: RaftRole,

    // Known leader (if any)
    pub leader_id: Option<String>,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: vec![LogEntry {
                term: 0,
                index: 0,
                command: String::new(),
            }],
            commit_index: 0,
            last_applied: 0,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            role: RaftRole::Follower,
            leader_id: None,
        }
    }

    /// Index of the last entry (0 when only the sentinel is present).
    pub fn last_log_index(&self) -> u64 {
        (self.log.len() - 1) as u64
    }

    pub fn last_log_term(&self) -> u64 {
        self.log.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn entry(&self, index: u64) -> Option<&LogEntry> {
        self.log.get(index as usize)
    }

    /// Entries from `start_index` (inclusive) to the end of the log.
    pub fn entries_from(&self, start_index: u64) -> Vec<LogEntry> {
        let start = (start_index as usize).min(self.log.len());
        self.log[start..].to_vec()
    }

    /// Append a new entry carrying the current term.
    pub fn append(&mut self, command: String) -> u64 {
        let index = self.log.len() as u64;
        self.log.push(LogEntry {
            term: self.current_term,
            index,
            command,
        });
        index
    }

    /// Drop every entry at `from_index` and beyond. The sentinel survives.
    pub fn truncate_from(&mut self, from_index: u64) {
        let keep = (from_index as usize).max(1);
        self.log.truncate(keep);
    }

    /// Check if a candidate's log is at least as up-to-date as ours:
    /// higher last term wins, equal terms compare last index.
    pub fn is_log_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let our_last_term = self.last_log_term();
        let our_last_index = self.last_log_index();

        last_log_term > our_last_term
            || (last_log_term == our_last_term && last_log_index >= our_last_index)
    }

    pub fn become_follower(&mut self, term: u64) {
        self.role = RaftRole::Follower;
        self.current_term = term;
        self.voted_for = None;
        self.leader_id = None;
    }

    pub fn become_candidate(&mut self, my_id: &str) {
        self.role = RaftRole::Candidate;
        self.current_term += 1;
        self.voted_for = Some(my_id.to_string());
        self.leader_id = None;
    }

    pub fn become_leader(&mut self, my_id: &str, peer_ids: &[String]) {
        self.role = RaftRole::Leader;
        self.leader_id = Some(my_id.to_string());

        let next = self.last_log_index() + 1;
        self.next_index.clear();
        self.match_index.clear();
        for peer_id in peer_ids {
            self.next_index.insert(peer_id.clone(), next);
            self.match_index.insert(peer_id.clone(), 0);
        }
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}
