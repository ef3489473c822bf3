use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use cuebridge_core::CoreError;
use cuebridge_pool::PoolError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`PoolError`] and [`CoreError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An error from the pool coordinator.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A plan-level error from `cuebridge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- PoolError variants ---
            AppError::Pool(pool) => match pool {
                PoolError::PoolSaturated { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "POOL_SATURATED",
                    pool.to_string(),
                ),
                PoolError::TaskNotFound(_) => {
                    (StatusCode::NOT_FOUND, "TASK_NOT_FOUND", pool.to_string())
                }
                PoolError::UnknownWorker(_) => {
                    (StatusCode::NOT_FOUND, "UNKNOWN_WORKER", pool.to_string())
                }
                PoolError::InvalidRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
                }
                PoolError::DispatchTimeout(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "DISPATCH_TIMEOUT",
                    pool.to_string(),
                ),
                PoolError::ShuttingDown => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SHUTTING_DOWN",
                    pool.to_string(),
                ),
            },

            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::PlanNotFound(_) => {
                    (StatusCode::NOT_FOUND, "PLAN_NOT_FOUND", core.to_string())
                }
                CoreError::PlanMalformed(_) => {
                    (StatusCode::BAD_REQUEST, "PLAN_MALFORMED", core.to_string())
                }
                CoreError::TaskIndexOutOfRange { .. }
                | CoreError::TaskIndexUnresolvable(_)
                | CoreError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", core.to_string())
                }
                CoreError::Io(e) => {
                    tracing::error!(error = %e, "I/O error in handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
