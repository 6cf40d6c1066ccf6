use crate::replicator::election::{self, VoteOutcome};
use crate::replicator::network::Transport;
use crate::replicator::peers::PeerDirectory;
use crate::replicator::replication::{self, ReplicationOutcome};
use crate::replicator::state::NodeState;
use crate::replicator::timer::ElectionTimer;
use crate::replicator::{RaftConfig, Replicator};
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

const EVENT_QUEUE_DEPTH: usize = 1024;

/// Inputs to the driver loop. Per-peer RPC tasks, the inbound handlers and
/// the command generator only ever talk to the driver through these.
#[derive(Debug)]
pub enum DriverEvent {
    /// An inbound RPC accepted a leader, granted a vote or stepped us down.
    ElectionTimerReset,
    VoteReply {
        peer: PeerId,
        term: Term,
        reply: VoteReply,
    },
    AppendReply {
        peer: PeerId,
        term: Term,
        reply: AppendEntriesReply,
    },
    /// Synthetic command from the generator owned by the leader of `term`.
    Propose { term: Term, command: Command },
}

struct Timers {
    election: ElectionTimer,
    armed_at: Instant,
    election_deadline: Instant,
    heartbeat_due: Instant,
}

impl Timers {
    fn arm_election(&mut self, from: Instant) {
        self.armed_at = from;
        self.election_deadline = from + self.election.next_timeout();
    }
}

/// The role state machine. Inbound handlers and the driver loop share
/// `NodeState` through one mutex; the driver is the only place that decides
/// elections, leadership and timer deadlines.
pub struct RaftNode {
    id: PeerId,
    peers: PeerDirectory,
    config: RaftConfig,
    state: Mutex<NodeState>,
    transport: Arc<dyn Transport>,
    events_tx: mpsc::Sender<DriverEvent>,
}

impl RaftNode {
    pub fn new(
        peers: PeerDirectory,
        config: RaftConfig,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::Receiver<DriverEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let id = peers.local_id();

        let node = Self {
            id,
            peers,
            config,
            state: Mutex::new(NodeState::new(id)),
            transport,
            events_tx,
        };

        (node, events_rx)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub async fn handle_request_vote(&self, req: VoteRequest) -> VoteReply {
        let mut state = self.state.lock().await;
        let handled = election::handle_request_vote(&mut state, &req, self.config.consistency);
        if handled.reset_election_timer {
            self.note_timer_reset(&mut state);
        }
        handled.reply
    }

    pub async fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesReply {
        let mut state = self.state.lock().await;
        let handled =
            replication::handle_append_entries(&mut state, &req, self.config.consistency);
        if handled.reset_election_timer {
            self.note_timer_reset(&mut state);
        }
        handled.reply
    }

    // Recorded under the lock so a timeout racing with this RPC sees it.
    fn note_timer_reset(&self, state: &mut NodeState) {
        state.election_reset_at = Some(Instant::now());
        let _ = self.events_tx.try_send(DriverEvent::ElectionTimerReset);
    }

    /// Runs the driver loop until `shutdown` flips or its sender goes away.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<DriverEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let now = Instant::now();
        let mut timers = Timers {
            election: ElectionTimer::new(
                self.config.election_timeout_min.as_millis() as u64,
                self.config.election_timeout_max.as_millis() as u64,
                self.config.rng_seed,
            ),
            armed_at: now,
            election_deadline: now,
            heartbeat_due: now,
        };
        timers.arm_election(now);

        let mut last_role = Role::Follower;
        let mut generator: Option<(Term, JoinHandle<()>)> = None;

        info!(node_id = self.id, cluster_size = self.peers.cluster_size(), "Raft node started");

        loop {
            let (role, term) = {
                let state = self.state.lock().await;
                (state.role, state.current_term)
            };

            if role != last_role {
                match role {
                    Role::Leader => timers.heartbeat_due = Instant::now(),
                    _ if last_role == Role::Leader => timers.arm_election(Instant::now()),
                    _ => {}
                }
                last_role = role;
            }
            self.sync_generator(role, term, &mut generator);

            let deadline = match role {
                Role::Leader => timers.heartbeat_due,
                _ => timers.election_deadline,
            };

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    break;
                }
                Some(event) = events.recv() => {
                    self.handle_event(event, &mut timers).await;
                }
                _ = sleep_until(deadline) => {
                    self.on_deadline(role, &mut timers).await;
                }
            }
        }

        if let Some((_, handle)) = generator.take() {
            handle.abort();
        }
        info!(node_id = self.id, "Raft node stopped");
    }

    fn sync_generator(&self, role: Role, term: Term, generator: &mut Option<(Term, JoinHandle<()>)>) {
        let Some(interval) = self.config.command_interval else {
            return;
        };

        let current = matches!(generator, Some((t, _)) if *t == term);
        if role == Role::Leader && !current {
            if let Some((_, handle)) = generator.take() {
                handle.abort();
            }
            *generator = Some((term, self.spawn_command_generator(term, interval)));
        } else if role != Role::Leader {
            if let Some((_, handle)) = generator.take() {
                handle.abort();
            }
        }
    }

    fn spawn_command_generator(&self, term: Term, interval: Duration) -> JoinHandle<()> {
        let events = self.events_tx.clone();
        let node_id = self.id;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut seq = 0u64;

            loop {
                ticker.tick().await;
                seq += 1;
                let command = Command::new(seq, format!("node {} command {}", node_id, seq));
                if events.send(DriverEvent::Propose { term, command }).await.is_err() {
                    break;
                }
            }
        })
    }

    async fn on_deadline(&self, role: Role, timers: &mut Timers) {
        if role == Role::Leader {
            self.broadcast_heartbeat().await;
            timers.heartbeat_due = Instant::now() + self.config.heartbeat_interval;
            return;
        }

        let mut state = self.state.lock().await;
        if state.role != role {
            return;
        }
        if let Some(reset_at) = state.election_reset_at {
            if reset_at > timers.armed_at {
                timers.arm_election(reset_at);
                return;
            }
        }

        if role == Role::Follower {
            info!(node_id = self.id, term = state.current_term, "Follower timed out");
        }
        state.become_candidate();
        info!(node_id = self.id, term = state.current_term, "Became candidate, starting election");
        timers.arm_election(Instant::now());

        if state.vote_count >= self.peers.majority() && state.claim_leadership_signal() {
            self.become_leader(&mut state, timers);
            return;
        }

        let req = election::vote_request(&state);
        drop(state);

        election::broadcast_request_vote(
            &self.transport,
            self.peers.others().cloned().collect(),
            req,
            self.config.rpc_timeout,
            &self.events_tx,
        );
    }

    fn become_leader(&self, state: &mut NodeState, timers: &mut Timers) {
        state.become_leader(&self.peers.other_ids());
        timers.heartbeat_due = Instant::now();
        info!(
            node_id = self.id,
            term = state.current_term,
            votes = state.vote_count,
            "Became leader"
        );
    }

    async fn broadcast_heartbeat(&self) {
        let requests = {
            let state = self.state.lock().await;
            if !state.is_leader() {
                return;
            }
            self.peers
                .others()
                .map(|peer| {
                    let req = replication::append_request(
                        &state,
                        peer.id,
                        self.config.max_entries_per_append,
                    );
                    (peer.clone(), req)
                })
                .collect::<Vec<_>>()
        };

        replication::broadcast_append_entries(
            &self.transport,
            requests,
            self.config.rpc_timeout,
            &self.events_tx,
        );
    }

    async fn handle_event(&self, event: DriverEvent, timers: &mut Timers) {
        match event {
            DriverEvent::ElectionTimerReset => {
                let state = self.state.lock().await;
                if !state.is_leader() {
                    timers.arm_election(state.election_reset_at.unwrap_or_else(Instant::now));
                }
            }
            DriverEvent::VoteReply { peer, term, reply } => {
                let mut state = self.state.lock().await;
                let outcome =
                    election::tally_vote(&mut state, peer, term, &reply, self.peers.majority());
                match outcome {
                    VoteOutcome::SteppedDown => {
                        info!(
                            node_id = self.id,
                            peer_id = peer,
                            term = state.current_term,
                            "Saw newer term in vote reply, stepping down"
                        );
                        timers.arm_election(Instant::now());
                    }
                    VoteOutcome::Won => self.become_leader(&mut state, timers),
                    VoteOutcome::Counted(votes) => {
                        debug!(node_id = self.id, peer_id = peer, votes, "Received vote");
                    }
                    VoteOutcome::Rejected => {
                        debug!(node_id = self.id, peer_id = peer, "Vote refused");
                    }
                    VoteOutcome::Stale => {
                        trace!(node_id = self.id, peer_id = peer, term, "Ignoring stale vote reply");
                    }
                }
            }
            DriverEvent::AppendReply { peer, term, reply } => {
                let mut state = self.state.lock().await;
                match replication::apply_append_reply(&mut state, peer, term, &reply) {
                    ReplicationOutcome::SteppedDown => {
                        info!(
                            node_id = self.id,
                            peer_id = peer,
                            term = state.current_term,
                            "Saw newer term in append reply, stepping down"
                        );
                        timers.arm_election(Instant::now());
                    }
                    ReplicationOutcome::Progress { match_index } => {
                        debug!(node_id = self.id, peer_id = peer, match_index, "Follower caught up");
                        replication::advance_leader_commit(&mut state);
                    }
                    ReplicationOutcome::Resync { next_index } => {
                        debug!(node_id = self.id, peer_id = peer, next_index, "Follower behind, resyncing");
                    }
                    ReplicationOutcome::Stale | ReplicationOutcome::Unchanged => {}
                }
            }
            DriverEvent::Propose { term, command } => {
                let mut state = self.state.lock().await;
                if !state.is_leader() || state.current_term != term {
                    trace!(node_id = self.id, term, "Dropping command from previous leadership");
                    return;
                }
                let entry = state.log.append_command(term, command);
                debug!(node_id = self.id, index = entry.index, term, "Appended command");
                replication::advance_leader_commit(&mut state);
            }
        }
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.lock().await.status()
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.state.lock().await.log.entries().to_vec()
    }
}

#[async_trait]
impl Replicator for RaftNode {
    async fn status(&self) -> NodeStatus {
        RaftNode::status(self).await
    }

    async fn log_entries(&self) -> Vec<LogEntry> {
        RaftNode::log_entries(self).await
    }

    async fn is_leader(&self) -> bool {
        self.state.lock().await.is_leader()
    }

    async fn leader_id(&self) -> Option<PeerId> {
        self.state.lock().await.leader_id
    }
}
