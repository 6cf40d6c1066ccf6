use crate::replicator::RaftNode;
use crate::types::*;
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;

/// Inbound half of the RPC channel. Protocol-level rejections travel in the
/// reply body, so these handlers always answer 200.
pub fn create_raft_router(node: Arc<RaftNode>) -> Router {
    Router::new()
        .route("/raft/request_vote", post(handle_request_vote))
        .route("/raft/append_entries", post(handle_append_entries))
        .with_state(node)
}

async fn handle_request_vote(
    State(node): State<Arc<RaftNode>>,
    Json(req): Json<VoteRequest>,
) -> Json<VoteReply> {
    Json(node.handle_request_vote(req).await)
}

async fn handle_append_entries(
    State(node): State<Arc<RaftNode>>,
    Json(req): Json<AppendEntriesRequest>,
) -> Json<AppendEntriesReply> {
    Json(node.handle_append_entries(req).await)
}
