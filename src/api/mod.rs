//! HTTP read surface: the latest published snapshot, nothing else.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::Snapshot;

/// Latest snapshot, swapped whole on every pipeline run.
pub type SnapshotStore = Arc<RwLock<Option<Snapshot>>>;

pub fn new_store() -> SnapshotStore {
    Arc::new(RwLock::new(None))
}

pub fn router(store: SnapshotStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn snapshot(State(store): State<SnapshotStore>) -> impl IntoResponse {
    let snapshot = store.read().clone();
    match snapshot {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no snapshot published yet" })),
        )
            .into_response(),
    }
}
