use crate::error::TransportError;
use crate::replicator::network::Transport;
use crate::replicator::peers::Peer;
use crate::replicator::raft_node::RaftNode;
use crate::types::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// In-process hub that routes RPCs straight into other nodes' handlers.
/// Isolating a node drops every call to or from it, which models a
/// network partition.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<PeerId, Weak<RaftNode>>>,
    isolated: RwLock<HashSet<PeerId>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(self: &Arc<Self>, from: PeerId) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            from,
            network: self.clone(),
        })
    }

    pub async fn register(&self, node: &Arc<RaftNode>) {
        self.nodes
            .write()
            .await
            .insert(node.id(), Arc::downgrade(node));
    }

    pub async fn isolate(&self, id: PeerId) {
        self.isolated.write().await.insert(id);
    }

    pub async fn heal(&self, id: PeerId) {
        self.isolated.write().await.remove(&id);
    }

    pub async fn heal_all(&self) {
        self.isolated.write().await.clear();
    }

    async fn route(&self, from: PeerId, to: &Peer) -> Result<Arc<RaftNode>, TransportError> {
        let unreachable = |reason: &str| TransportError::Unreachable {
            addr: to.address.clone(),
            reason: reason.to_string(),
        };

        {
            let isolated = self.isolated.read().await;
            if isolated.contains(&from) || isolated.contains(&to.id) {
                return Err(unreachable("partitioned"));
            }
        }

        self.nodes
            .read()
            .await
            .get(&to.id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable("no such node"))
    }
}

pub struct LocalTransport {
    from: PeerId,
    network: Arc<LocalNetwork>,
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request_vote(
        &self,
        peer: &Peer,
        req: VoteRequest,
    ) -> Result<VoteReply, TransportError> {
        let node = self.network.route(self.from, peer).await?;
        Ok(node.handle_request_vote(req).await)
    }

    async fn append_entries(
        &self,
        peer: &Peer,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesReply, TransportError> {
        let node = self.network.route(self.from, peer).await?;
        Ok(node.handle_append_entries(req).await)
    }
}
