use crate::replicator::{ConsistencyMode, Peer, PeerDirectory, RaftConfig};
use crate::types::PeerId;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: PeerId,

    pub bind_addr: String,
    pub bind_port: u16,

    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub rpc_timeout_ms: u64,

    pub generate_commands: bool,
    pub command_interval_ms: u64,
    pub max_entries_per_append: usize,

    pub consistency: ConsistencyMode,
    pub rng_seed: Option<u64>,

    /// Full cluster membership, including this node. Must stay the last
    /// field: TOML tables follow plain values.
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    pub node_id: PeerId,
    pub addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            bind_addr: "0.0.0.0".to_string(),
            bind_port: 9091,
            election_timeout_min_ms: 300,
            election_timeout_max_ms: 500,
            heartbeat_interval_ms: 100,
            rpc_timeout_ms: 80,
            generate_commands: true,
            command_interval_ms: 3000,
            max_entries_per_append: 64,
            consistency: ConsistencyMode::Simplified,
            rng_seed: None,
            peers: vec![PeerConfig {
                node_id: 1,
                addr: "127.0.0.1:9091".to_string(),
            }],
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replaces the membership with a comma-separated address list; entry k
    /// becomes peer id k+1.
    pub fn set_cluster(&mut self, cluster: &str) {
        self.peers = cluster
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .enumerate()
            .map(|(i, addr)| PeerConfig {
                node_id: i as PeerId + 1,
                addr: addr.to_string(),
            })
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        if self.peers.is_empty() {
            bail!("cluster membership is empty");
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.node_id) {
                bail!("duplicate peer id {}", peer.node_id);
            }
        }
        if !seen.contains(&self.node_id) {
            bail!("node id {} is not part of the cluster", self.node_id);
        }

        if self.election_timeout_min_ms == 0 {
            bail!("election_timeout_min_ms must be positive");
        }
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            bail!(
                "election timeout window is empty: {}..{}",
                self.election_timeout_min_ms,
                self.election_timeout_max_ms
            );
        }
        if self.heartbeat_interval_ms == 0
            || self.heartbeat_interval_ms >= self.election_timeout_min_ms
        {
            bail!(
                "heartbeat_interval_ms ({}) must be positive and below election_timeout_min_ms ({})",
                self.heartbeat_interval_ms,
                self.election_timeout_min_ms
            );
        }
        if self.rpc_timeout_ms == 0 {
            bail!("rpc_timeout_ms must be positive");
        }
        if self.generate_commands && self.command_interval_ms == 0 {
            bail!("command_interval_ms must be positive when generate_commands is set");
        }
        if self.max_entries_per_append == 0 {
            bail!("max_entries_per_append must be positive");
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    pub fn peer_directory(&self) -> PeerDirectory {
        PeerDirectory::new(
            self.node_id,
            self.peers.iter().map(|p| Peer {
                id: p.node_id,
                address: p.addr.clone(),
            }),
        )
    }

    pub fn raft_config(&self) -> RaftConfig {
        RaftConfig {
            election_timeout_min: Duration::from_millis(self.election_timeout_min_ms),
            election_timeout_max: Duration::from_millis(self.election_timeout_max_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            command_interval: self
                .generate_commands
                .then(|| Duration::from_millis(self.command_interval_ms)),
            max_entries_per_append: self.max_entries_per_append,
            consistency: self.consistency,
            rng_seed: self.rng_seed,
        }
    }
}
