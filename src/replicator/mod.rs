pub mod election;
mod local;
mod network;
mod peers;
mod raft_node;
pub mod replication;
mod state;
mod storage;
mod timer;

pub use local::*;
pub use network::*;
pub use peers::*;
pub use raft_node::*;
pub use state::*;
pub use storage::*;
pub use timer::*;

use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read side of a consensus node, as seen by the HTTP API.
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn status(&self) -> NodeStatus;
    async fn log_entries(&self) -> Vec<LogEntry>;
    async fn is_leader(&self) -> bool;
    async fn leader_id(&self) -> Option<PeerId>;
}

/// How strictly followers check the leader's log before accepting entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// No prev-term check, no truncation, no log freshness check on votes;
    /// followers commit everything they append.
    #[default]
    Simplified,
    /// Full log matching: prev-term check, conflict truncation, vote
    /// restriction, and commit bounded by the leader's commit index.
    Strict,
}

#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
    /// Period of the synthetic command generator; `None` disables it.
    pub command_interval: Option<Duration>,
    pub max_entries_per_append: usize,
    pub consistency: ConsistencyMode,
    pub rng_seed: Option<u64>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(300),
            election_timeout_max: Duration::from_millis(500),
            heartbeat_interval: Duration::from_millis(100),
            rpc_timeout: Duration::from_millis(80),
            command_interval: Some(Duration::from_secs(3)),
            max_entries_per_append: 64,
            consistency: ConsistencyMode::Simplified,
            rng_seed: None,
        }
    }
}

/// A handler's reply plus whether the driver must re-arm its election timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled<R> {
    pub reply: R,
    pub reset_election_timer: bool,
}

impl<R> Handled<R> {
    pub fn new(reply: R) -> Self {
        Self {
            reply,
            reset_election_timer: false,
        }
    }
}
