use crate::replicator::{LocalNetwork, Peer, PeerDirectory, RaftConfig, RaftNode};
use crate::types::{NodeStatus, PeerId};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A whole cluster inside one process, wired through a [`LocalNetwork`].
pub struct LocalCluster {
    network: Arc<LocalNetwork>,
    nodes: Vec<Arc<RaftNode>>,
    drivers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl LocalCluster {
    /// Starts `size` nodes with ids 1..=size. `configure` may tweak the
    /// config of each node before it starts.
    pub async fn start<F>(size: usize, mut configure: F) -> Result<Self>
    where
        F: FnMut(PeerId, &mut RaftConfig),
    {
        if size == 0 {
            bail!("a cluster needs at least one node");
        }

        let network = LocalNetwork::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let members: Vec<Peer> = (1..=size as PeerId)
            .map(|id| Peer {
                id,
                address: format!("local-{}", id),
            })
            .collect();

        let mut nodes = Vec::with_capacity(size);
        let mut drivers = Vec::with_capacity(size);

        for peer in &members {
            let mut config = RaftConfig {
                rng_seed: Some(peer.id),
                ..RaftConfig::default()
            };
            configure(peer.id, &mut config);

            let directory = PeerDirectory::new(peer.id, members.clone());
            let (node, events) = RaftNode::new(directory, config, network.transport(peer.id));
            let node = Arc::new(node);
            network.register(&node).await;

            let driver = node.clone();
            let shutdown = shutdown_rx.clone();
            drivers.push(tokio::spawn(async move {
                driver.run(events, shutdown).await;
            }));
            nodes.push(node);
        }

        Ok(Self {
            network,
            nodes,
            drivers,
            shutdown_tx,
        })
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }

    pub fn nodes(&self) -> &[Arc<RaftNode>] {
        &self.nodes
    }

    pub fn node(&self, id: PeerId) -> Option<&Arc<RaftNode>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub async fn statuses(&self) -> Vec<NodeStatus> {
        let mut statuses = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            statuses.push(node.status().await);
        }
        statuses
    }

    pub async fn leaders(&self) -> Vec<NodeStatus> {
        self.statuses()
            .await
            .into_iter()
            .filter(NodeStatus::is_leader)
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for driver in self.drivers {
            let _ = driver.await;
        }
    }
}

/// Runs an in-process cluster for `duration` and returns every node's
/// final status.
pub async fn run_simulation(size: usize, duration: Duration) -> Result<Vec<NodeStatus>> {
    let cluster = LocalCluster::start(size, |_, config| {
        config.command_interval = Some(Duration::from_millis(500));
    })
    .await?;

    tokio::time::sleep(duration).await;

    let statuses = cluster.statuses().await;
    cluster.shutdown().await;
    Ok(statuses)
}
