//! Pool-wide status and lifecycle endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use cuebridge_pool::PoolSnapshot;

use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/shutdown", post(shutdown))
}

/// `GET /status` -- queue depth, running tasks, and the slot table.
async fn status(State(state): State<AppState>) -> AppResult<Json<PoolSnapshot>> {
    Ok(Json(state.pool.status().await?))
}

/// `POST /shutdown` -- drain the pool and stop the service.
async fn shutdown(State(state): State<AppState>) -> Json<serde_json::Value> {
    tracing::info!("Shutdown requested over HTTP");
    state.shutdown.cancel();
    Json(json!({ "status": "shutting_down" }))
}
