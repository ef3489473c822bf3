//! Submitter-facing task endpoints.

use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use cuebridge_core::plan::{verify_sha256, RenderPlan};
use cuebridge_pool::{TaskRequest, TaskSnapshot};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(submit_task).get(list_tasks))
        .route("/tasks/{task_id}", get(get_task))
        .route("/tasks/{task_id}/cancel", post(cancel_task))
}

/// Task submission body: either an inline plan or a path to a plan file
/// on the shared data root (with an optional integrity checksum).
#[derive(Debug, Deserialize)]
struct SubmitTaskBody {
    #[serde(default)]
    plan: Option<RenderPlan>,
    #[serde(default)]
    plan_path: Option<PathBuf>,
    #[serde(default)]
    plan_sha256: Option<String>,
    task_index: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitQuery {
    /// Block until the task reaches a terminal state.
    #[serde(default)]
    wait: bool,
}

/// `POST /tasks` -- queue one plan task.
///
/// Returns 202 with the task id, or with `?wait=true` blocks until the
/// task finishes and returns its final snapshot.
async fn submit_task(
    State(state): State<AppState>,
    Query(query): Query<SubmitQuery>,
    Json(body): Json<SubmitTaskBody>,
) -> AppResult<Response> {
    let plan = match (body.plan, body.plan_path) {
        (Some(plan), _) => plan,
        (None, Some(path)) => {
            if let Some(expected) = &body.plan_sha256 {
                verify_sha256(&path, expected)?;
            }
            RenderPlan::load(&path)?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "either plan or plan_path is required".to_string(),
            ));
        }
    };

    let request = TaskRequest {
        plan,
        task_index: body.task_index,
    };

    if query.wait {
        let snapshot = state.pool.submit_and_wait(request).await?;
        Ok(Json(snapshot).into_response())
    } else {
        let task_id = state.pool.submit(request).await?;
        Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))).into_response())
    }
}

/// `GET /tasks` -- every tracked task, oldest first.
async fn list_tasks(State(state): State<AppState>) -> AppResult<Json<Vec<TaskSnapshot>>> {
    Ok(Json(state.pool.tasks().await?))
}

/// `GET /tasks/{task_id}`.
async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskSnapshot>> {
    Ok(Json(state.pool.task(task_id).await?))
}

/// `POST /tasks/{task_id}/cancel`. Idempotent on finished tasks.
async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskSnapshot>> {
    Ok(Json(state.pool.cancel(task_id).await?))
}
