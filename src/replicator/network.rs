use crate::error::TransportError;
use crate::replicator::peers::Peer;
use crate::types::*;
use async_trait::async_trait;
use std::time::Duration;

/// Outbound half of the RPC channel: one request, one reply (or failure).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request_vote(&self, peer: &Peer, req: VoteRequest)
        -> Result<VoteReply, TransportError>;

    async fn append_entries(
        &self,
        peer: &Peer,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesReply, TransportError>;
}

/// JSON over HTTP, matching the routes served by `create_raft_router`.
/// Connection pooling is disabled so every call releases its connection.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(rpc_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(rpc_timeout)
            .connect_timeout(rpc_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TransportError::from_reqwest("<client>", e))?;
        Ok(Self { client })
    }

    async fn send_rpc<Req, Resp>(&self, peer: &Peer, path: &str, req: &Req) -> Result<Resp, TransportError>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let url = format!("http://{}/raft/{}", peer.address, path);

        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&peer.address, e))?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                addr: peer.address.clone(),
                status: response.status().as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::from_reqwest(&peer.address, e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request_vote(
        &self,
        peer: &Peer,
        req: VoteRequest,
    ) -> Result<VoteReply, TransportError> {
        self.send_rpc(peer, "request_vote", &req).await
    }

    async fn append_entries(
        &self,
        peer: &Peer,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesReply, TransportError> {
        self.send_rpc(peer, "append_entries", &req).await
    }
}
