use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub status: &'static str,
    pub db: bool,
    pub database_name: String,
}

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/api/hello", get(hello))
        .route("/health", get(|| async { "ok" }))
        .route("/test", get(store_status))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello from the FastDevp backend!" }))
}

async fn hello() -> Json<Value> {
    Json(json!({ "message": "Hello from the backend API!" }))
}

/// Always 200; an unreachable store shows up as `db: false`.
pub async fn store_status(State(state): State<AppState>) -> Json<StoreStatus> {
    let db = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "store ping failed");
            false
        }
    };
    Json(StoreStatus {
        status: "ok",
        db,
        database_name: state.config.database_name.clone(),
    })
}
