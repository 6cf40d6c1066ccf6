use crate::api::create_router;
use crate::config::NodeConfig;
use crate::raft_api::create_raft_router;
use crate::replicator::{DriverEvent, HttpTransport, RaftNode, Replicator};
use anyhow::{anyhow, Result};
use axum::Router;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::info;

/// One consensus node served over HTTP.
pub struct RaftDaemon {
    node: Arc<RaftNode>,
    config: NodeConfig,
    events: Mutex<Option<mpsc::Receiver<DriverEvent>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RaftDaemon {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let peers = config.peer_directory();
        let raft_config = config.raft_config();
        let transport = Arc::new(HttpTransport::new(raft_config.rpc_timeout)?);

        info!(
            "Initializing RaftDaemon node_id={} cluster_size={} consistency={:?}",
            config.node_id,
            peers.cluster_size(),
            raft_config.consistency
        );

        let (node, events) = RaftNode::new(peers, raft_config, transport);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            node: Arc::new(node),
            config,
            events: Mutex::new(Some(events)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// RPC routes plus the read-only status routes.
    pub fn router(&self) -> Router {
        let replicator: Arc<dyn Replicator> = self.node.clone();
        create_router(replicator).merge(create_raft_router(self.node.clone()))
    }

    /// Drives the node until `shutdown` is called. Can only run once.
    pub async fn run(&self) -> Result<()> {
        let events = self
            .events
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("daemon is already running"))?;

        info!("RaftDaemon running on {}", self.config.listen_addr());
        self.node.run(events, self.shutdown_rx.clone()).await;
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn node(&self) -> &Arc<RaftNode> {
        &self.node
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}
