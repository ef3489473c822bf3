//! The worker control channel.
//!
//! These endpoints are called by the pool's own engine workers, not by
//! submitters: report ready after boot, poll for a lease, heartbeat
//! while rendering, and post the completion report.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use cuebridge_pool::{DoneReport, WorkerSnapshot};

use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workers", get(list_workers))
        .route("/workers/{worker_id}/ready", post(worker_ready))
        .route("/workers/{worker_id}/lease", get(lease))
        .route("/workers/{worker_id}/heartbeat", post(heartbeat))
        .route("/workers/{worker_id}/done", post(done))
}

/// `GET /workers` -- slot table snapshot.
async fn list_workers(State(state): State<AppState>) -> AppResult<Json<Vec<WorkerSnapshot>>> {
    Ok(Json(state.pool.workers().await?))
}

/// `POST /workers/{id}/ready` -- the engine finished booting.
async fn worker_ready(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> AppResult<StatusCode> {
    state.pool.worker_ready(&worker_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /workers/{id}/lease` -- 200 with a lease payload, or 204 when
/// the queue is empty.
async fn lease(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> AppResult<Response> {
    match state.pool.lease(&worker_id).await? {
        Some(payload) => Ok(Json(payload).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Deserialize, Default)]
struct HeartbeatBody {
    #[serde(default)]
    progress: Option<f64>,
}

/// `POST /workers/{id}/heartbeat` -- liveness plus optional progress.
async fn heartbeat(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    body: Option<Json<HeartbeatBody>>,
) -> AppResult<StatusCode> {
    let progress = body.and_then(|Json(b)| b.progress);
    state.pool.heartbeat(&worker_id, progress).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /workers/{id}/done` -- completion report for the leased task.
async fn done(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(report): Json<DoneReport>,
) -> AppResult<StatusCode> {
    state.pool.done(&worker_id, report).await?;
    Ok(StatusCode::NO_CONTENT)
}
