use crate::replicator::network::Transport;
use crate::replicator::peers::Peer;
use crate::replicator::raft_node::DriverEvent;
use crate::replicator::state::NodeState;
use crate::replicator::{ConsistencyMode, Handled};
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Inbound `AppendEntries`, covering both heartbeats and entry batches.
pub fn handle_append_entries(
    state: &mut NodeState,
    req: &AppendEntriesRequest,
    mode: ConsistencyMode,
) -> Handled<AppendEntriesReply> {
    if req.term < state.current_term {
        debug!(
            node_id = state.id,
            leader = req.leader_id,
            term = req.term,
            current_term = state.current_term,
            "Rejecting append from stale leader"
        );
        return Handled::new(AppendEntriesReply {
            term: state.current_term,
            success: false,
            next_index: None,
        });
    }

    state.observe_term(req.term);
    if state.role != Role::Follower {
        state.become_follower(req.term);
    }
    state.leader_id = Some(req.leader_id);
    state.last_contact = Some(Utc::now());

    let reply = match mode {
        ConsistencyMode::Simplified => append_simplified(state, req),
        ConsistencyMode::Strict => append_strict(state, req),
    };

    for entry in state.log.apply_committed() {
        debug!(node_id = state.id, index = entry.index, term = entry.term, "Applied entry");
    }

    Handled {
        reply,
        reset_election_timer: true,
    }
}

fn append_simplified(state: &mut NodeState, req: &AppendEntriesRequest) -> AppendEntriesReply {
    if req.is_heartbeat() {
        debug!(node_id = state.id, leader = req.leader_id, term = req.term, "Received heartbeat");
        return AppendEntriesReply {
            term: state.current_term,
            success: true,
            next_index: None,
        };
    }

    let last_index = state.log.last_index();
    if req.prev_log_index > last_index {
        debug!(
            node_id = state.id,
            prev_log_index = req.prev_log_index,
            last_index,
            "Missing entries, asking leader to resend"
        );
        return AppendEntriesReply {
            term: state.current_term,
            success: false,
            next_index: Some(last_index + 1),
        };
    }

    let added = state.log.append_new(&req.entries);
    state.log.commit_to(state.log.last_index());
    debug!(
        node_id = state.id,
        added,
        last_index = state.log.last_index(),
        "Appended entries"
    );

    AppendEntriesReply {
        term: state.current_term,
        success: true,
        next_index: Some(state.log.last_index() + 1),
    }
}

fn append_strict(state: &mut NodeState, req: &AppendEntriesRequest) -> AppendEntriesReply {
    let last_index = state.log.last_index();
    if req.prev_log_index > last_index {
        return AppendEntriesReply {
            term: state.current_term,
            success: false,
            next_index: Some(last_index + 1),
        };
    }

    if state.log.term_at(req.prev_log_index) != Some(req.prev_log_term) {
        debug!(
            node_id = state.id,
            prev_log_index = req.prev_log_index,
            prev_log_term = req.prev_log_term,
            "Log mismatch at previous index"
        );
        return AppendEntriesReply {
            term: state.current_term,
            success: false,
            next_index: Some(req.prev_log_index.max(1)),
        };
    }

    if req.is_heartbeat() {
        debug!(node_id = state.id, leader = req.leader_id, term = req.term, "Received heartbeat");
    } else {
        let added = state.log.append_truncating(&req.entries);
        debug!(
            node_id = state.id,
            added,
            last_index = state.log.last_index(),
            "Appended entries"
        );
    }

    let last_new = req.prev_log_index + req.entries.len() as LogIndex;
    if req.leader_commit > state.log.commit_index() {
        state.log.commit_to(req.leader_commit.min(last_new));
    }

    AppendEntriesReply {
        term: state.current_term,
        success: true,
        next_index: Some(last_new + 1),
    }
}

/// Builds the next `AppendEntries` for `peer` from the leader's progress.
pub fn append_request(state: &NodeState, peer: PeerId, max_entries: usize) -> AppendEntriesRequest {
    let last_index = state.log.last_index();
    let next = state
        .next_index
        .get(&peer)
        .copied()
        .unwrap_or(last_index + 1)
        .clamp(1, last_index + 1);
    let prev_log_index = next - 1;

    AppendEntriesRequest {
        term: state.current_term,
        leader_id: state.id,
        prev_log_index,
        prev_log_term: state.log.term_at(prev_log_index).unwrap_or(0),
        entries: state.log.entries_from(next, max_entries),
        leader_commit: state.log.commit_index(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationOutcome {
    SteppedDown,
    Stale,
    Progress { match_index: LogIndex },
    Resync { next_index: LogIndex },
    Unchanged,
}

/// Folds one `AppendEntries` reply into the leader's per-peer progress.
pub fn apply_append_reply(
    state: &mut NodeState,
    peer: PeerId,
    request_term: Term,
    reply: &AppendEntriesReply,
) -> ReplicationOutcome {
    if state.observe_term(reply.term) {
        return ReplicationOutcome::SteppedDown;
    }
    if !state.is_leader() || state.current_term != request_term {
        return ReplicationOutcome::Stale;
    }
    let Some(hint) = reply.next_index else {
        return ReplicationOutcome::Unchanged;
    };

    let last_index = state.log.last_index();
    let next = state.next_index.entry(peer).or_insert(last_index + 1);

    if reply.success {
        let hint = hint.clamp(1, last_index + 1);
        if hint > *next {
            *next = hint;
        }
        let matched = state.match_index.entry(peer).or_insert(0);
        if hint - 1 > *matched {
            *matched = hint - 1;
            return ReplicationOutcome::Progress {
                match_index: *matched,
            };
        }
        ReplicationOutcome::Unchanged
    } else if hint >= 1 && hint < *next {
        *next = hint;
        ReplicationOutcome::Resync { next_index: hint }
    } else {
        ReplicationOutcome::Unchanged
    }
}

/// Moves the leader's commit index to the highest index stored on a
/// majority, provided that entry belongs to the current term.
pub fn advance_leader_commit(state: &mut NodeState) -> bool {
    if !state.is_leader() {
        return false;
    }

    let mut indices: Vec<LogIndex> = state.match_index.values().copied().collect();
    indices.push(state.log.last_index());
    indices.sort_unstable_by(|a, b| b.cmp(a));
    let majority = indices.len() / 2 + 1;
    let candidate = indices[majority - 1];

    if candidate > state.log.commit_index()
        && state.log.term_at(candidate) == Some(state.current_term)
        && state.log.commit_to(candidate)
    {
        debug!(node_id = state.id, commit_index = candidate, "Advanced commit index");
        for entry in state.log.apply_committed() {
            debug!(node_id = state.id, index = entry.index, term = entry.term, "Applied entry");
        }
        return true;
    }
    false
}

/// Sends one `AppendEntries` per peer concurrently, funneling replies back
/// to the driver.
pub fn broadcast_append_entries(
    transport: &Arc<dyn Transport>,
    requests: Vec<(Peer, AppendEntriesRequest)>,
    rpc_timeout: Duration,
    events: &mpsc::Sender<DriverEvent>,
) {
    for (peer, req) in requests {
        if !req.is_heartbeat() {
            debug!(
                peer_id = peer.id,
                from = req.prev_log_index + 1,
                count = req.entries.len(),
                "Sending entries"
            );
        }

        let transport = transport.clone();
        let events = events.clone();
        let term = req.term;

        tokio::spawn(async move {
            match tokio::time::timeout(rpc_timeout, transport.append_entries(&peer, req)).await {
                Ok(Ok(reply)) => {
                    let _ = events
                        .send(DriverEvent::AppendReply {
                            peer: peer.id,
                            term,
                            reply,
                        })
                        .await;
                }
                Ok(Err(e)) => {
                    trace!(peer_id = peer.id, error = %e, "AppendEntries failed");
                }
                Err(_) => {
                    trace!(peer_id = peer.id, "AppendEntries timed out");
                }
            }
        });
    }
}
