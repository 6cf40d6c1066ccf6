use crate::replicator::storage::LogStore;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::time::Instant;

/// Everything a node knows about the consensus protocol. Shared between the
/// driver loop and the inbound RPC handlers behind a single mutex.
#[derive(Debug)]
pub struct NodeState {
    pub id: PeerId,
    pub role: Role,
    pub current_term: Term,
    pub voted_for: Option<PeerId>,
    pub vote_count: usize,
    pub log: LogStore,

    // Leader only; rebuilt on every election win.
    pub next_index: HashMap<PeerId, LogIndex>,
    pub match_index: HashMap<PeerId, LogIndex>,

    pub leader_id: Option<PeerId>,
    pub last_contact: Option<DateTime<Utc>>,
    /// Last time an inbound RPC asked for the election timer to restart.
    pub election_reset_at: Option<Instant>,

    votes_from: BTreeSet<PeerId>,
    leadership_signaled: bool,
}

impl NodeState {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            role: Role::Follower,
            current_term: 0,
            voted_for: None,
            vote_count: 0,
            log: LogStore::new(),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            leader_id: None,
            last_contact: None,
            election_reset_at: None,
            votes_from: BTreeSet::new(),
            leadership_signaled: false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// Adopts `term` if it is newer, reverting to follower with no vote.
    /// Returns true if the term advanced.
    pub fn observe_term(&mut self, term: Term) -> bool {
        if term > self.current_term {
            self.become_follower(term);
            true
        } else {
            false
        }
    }

    pub fn become_follower(&mut self, term: Term) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        }
        self.role = Role::Follower;
        self.clear_election();
        self.next_index.clear();
        self.match_index.clear();
    }

    /// Starts a new term as candidate, voting for ourselves.
    pub fn become_candidate(&mut self) {
        self.role = Role::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.clear_election();
        self.votes_from.insert(self.id);
        self.vote_count = 1;
        self.next_index.clear();
        self.match_index.clear();
    }

    pub fn become_leader(&mut self, peers: &[PeerId]) {
        self.role = Role::Leader;
        self.leader_id = Some(self.id);
        let next = self.log.last_index() + 1;
        self.next_index = peers.iter().map(|&p| (p, next)).collect();
        self.match_index = peers.iter().map(|&p| (p, 0)).collect();
    }

    /// Counts a granted vote from `peer` for the current election. Duplicate
    /// grants from the same peer are ignored.
    pub fn record_vote(&mut self, peer: PeerId) -> usize {
        self.votes_from.insert(peer);
        self.vote_count = self.votes_from.len();
        self.vote_count
    }

    /// Set-once latch for the majority crossing of the current election.
    /// Only the first call per election returns true.
    pub fn claim_leadership_signal(&mut self) -> bool {
        if self.leadership_signaled {
            return false;
        }
        self.leadership_signaled = true;
        true
    }

    fn clear_election(&mut self) {
        self.votes_from.clear();
        self.vote_count = 0;
        self.leadership_signaled = false;
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.id,
            role: self.role,
            current_term: self.current_term,
            voted_for: self.voted_for,
            leader_id: self.leader_id,
            vote_count: self.vote_count,
            commit_index: self.log.commit_index(),
            last_applied: self.log.last_applied(),
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
            last_contact: self.last_contact,
        }
    }
}
