//! Observability HTTP surface: health, queue stats, enqueue, dead-letter
//! inspection.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use opshub_core::error::{AppError, ErrorKind};
use opshub_database::{DatabasePool, NotificationQueueRepository};
use opshub_entity::notification::{CreateNotification, NotificationRecord};
use opshub_notifier::store::{QueueStats, QueueStore};

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabasePool,
    pub queue: Arc<NotificationQueueRepository>,
}

/// Build the router with all observability routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/notifications", post(enqueue))
        .route("/notifications/dead", get(list_dead))
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.db.health_check().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// GET /stats
async fn stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}

/// POST /notifications
async fn enqueue(
    State(state): State<AppState>,
    Json(data): Json<CreateNotification>,
) -> Result<(StatusCode, Json<NotificationRecord>), ApiError> {
    if data.recipient.is_empty() {
        return Err(AppError::validation("recipient must not be empty").into());
    }
    if data.max_retries < 0 {
        return Err(AppError::validation("max_retries must not be negative").into());
    }

    let record = state.queue.enqueue(&data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /notifications/dead
async fn list_dead(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationRecord>>, ApiError> {
    let records = state.queue.list_dead(100).await?;
    Ok(Json(records))
}

/// Standard error response body.
#[derive(Debug, serde::Serialize)]
struct ApiErrorResponse {
    /// Machine-readable error code.
    error: String,
    /// Human-readable message.
    message: String,
}

/// Newtype so `AppError` can be converted into an HTTP response.
#[derive(Debug)]
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0.kind {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ErrorKind::Database => {
                tracing::error!(error = %self.0.message, "Backing store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ErrorKind::Internal | ErrorKind::Configuration => {
                tracing::error!(error = %self.0.message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ApiErrorResponse {
            error: error_code.to_string(),
            message: self.0.message.clone(),
        };

        (status, Json(body)).into_response()
    }
}
