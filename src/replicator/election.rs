use crate::replicator::network::Transport;
use crate::replicator::peers::Peer;
use crate::replicator::raft_node::DriverEvent;
use crate::replicator::state::NodeState;
use crate::replicator::{ConsistencyMode, Handled};
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Inbound `RequestVote`. Grants at most one candidate per term.
pub fn handle_request_vote(
    state: &mut NodeState,
    req: &VoteRequest,
    mode: ConsistencyMode,
) -> Handled<VoteReply> {
    if req.term < state.current_term {
        debug!(
            node_id = state.id,
            candidate = req.candidate_id,
            term = req.term,
            current_term = state.current_term,
            "Rejecting vote for stale candidate"
        );
        return Handled::new(VoteReply {
            term: state.current_term,
            vote_granted: false,
        });
    }

    let stepped_down = state.observe_term(req.term);

    if mode == ConsistencyMode::Strict
        && !state.log.is_up_to_date(req.last_log_index, req.last_log_term)
    {
        debug!(
            node_id = state.id,
            candidate = req.candidate_id,
            "Rejecting vote, candidate log is behind"
        );
        return Handled {
            reply: VoteReply {
                term: state.current_term,
                vote_granted: false,
            },
            reset_election_timer: stepped_down,
        };
    }

    let granted = match state.voted_for {
        None => {
            state.voted_for = Some(req.candidate_id);
            true
        }
        Some(existing) => existing == req.candidate_id,
    };

    if granted {
        debug!(
            node_id = state.id,
            candidate = req.candidate_id,
            term = state.current_term,
            "Granted vote"
        );
    }

    Handled {
        reply: VoteReply {
            term: state.current_term,
            vote_granted: granted,
        },
        reset_election_timer: granted || stepped_down,
    }
}

pub fn vote_request(state: &NodeState) -> VoteRequest {
    VoteRequest {
        term: state.current_term,
        candidate_id: state.id,
        last_log_index: state.log.last_index(),
        last_log_term: state.log.last_term(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Reply carried a newer term; the node is now a follower.
    SteppedDown,
    /// Reply belongs to an election this node is no longer running.
    Stale,
    Rejected,
    Counted(usize),
    /// First majority crossing for this election.
    Won,
}

/// Folds one vote reply into the current election.
pub fn tally_vote(
    state: &mut NodeState,
    peer: PeerId,
    request_term: Term,
    reply: &VoteReply,
    majority: usize,
) -> VoteOutcome {
    if state.observe_term(reply.term) {
        return VoteOutcome::SteppedDown;
    }
    if state.role != Role::Candidate || state.current_term != request_term {
        return VoteOutcome::Stale;
    }
    if !reply.vote_granted {
        return VoteOutcome::Rejected;
    }

    let votes = state.record_vote(peer);
    if votes >= majority && state.claim_leadership_signal() {
        VoteOutcome::Won
    } else {
        VoteOutcome::Counted(votes)
    }
}

/// Sends `req` to every peer concurrently. Each reply is funneled back to
/// the driver; failures are logged and dropped for this round.
pub fn broadcast_request_vote(
    transport: &Arc<dyn Transport>,
    peers: Vec<Peer>,
    req: VoteRequest,
    rpc_timeout: Duration,
    events: &mpsc::Sender<DriverEvent>,
) {
    for peer in peers {
        let transport = transport.clone();
        let events = events.clone();
        let req = req.clone();

        tokio::spawn(async move {
            let result =
                tokio::time::timeout(rpc_timeout, transport.request_vote(&peer, req.clone())).await;
            match result {
                Ok(Ok(reply)) => {
                    let _ = events
                        .send(DriverEvent::VoteReply {
                            peer: peer.id,
                            term: req.term,
                            reply,
                        })
                        .await;
                }
                Ok(Err(e)) => {
                    warn!(peer_id = peer.id, term = req.term, error = %e, "Vote request failed");
                }
                Err(_) => {
                    warn!(peer_id = peer.id, term = req.term, "Vote request timed out");
                }
            }
        });
    }
}
