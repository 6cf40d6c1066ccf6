use crate::replicator::Replicator;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

pub fn create_router(replicator: Arc<dyn Replicator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/log", get(get_log))
        .with_state(replicator)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_status(State(replicator): State<Arc<dyn Replicator>>) -> impl IntoResponse {
    Json(replicator.status().await)
}

async fn get_log(State(replicator): State<Arc<dyn Replicator>>) -> impl IntoResponse {
    Json(replicator.log_entries().await)
}
