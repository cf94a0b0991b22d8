//! JSON RPC routes over HTTP.
//!
//! Every command takes `{"codeReviewId": "..."}` and answers with the updated
//! record. Errors come back as `{"code": ..., "message": ...}`.

use crate::commands::review;
use crate::commands::settings::{self, Settings, SettingsUpdate};
use crate::error::AppError;
use crate::models::{now, CodeReview};
use crate::services::review_store::ReviewStore;
use crate::services::sync_engine::{
    DiscoveryReport, RefreshReport, SyncEngine, SyncHandle, SyncStatus,
};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub engine: SyncEngine,
    /// `None` when no background loop runs (e.g. one-shot CLI use, tests).
    pub sync_handle: Option<SyncHandle>,
}

impl ApiState {
    fn store(&self) -> &ReviewStore {
        self.engine.store()
    }
}

// ── Error handling ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiError {
    code: String,
    message: String,
}

/// Wrapper to make AppError usable as an axum error response.
pub struct ApiErr(AppError);

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            e if e.is_upstream() => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            AppError::PersistAfterFetch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSIST_AFTER_FETCH")
            }
            AppError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        if status.is_server_error() {
            log::error!("[server] {}", self.0);
        }
        (
            status,
            Json(ApiError {
                code: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

// ── Request types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewCommand {
    code_review_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnoozeUntilTimeCommand {
    code_review_id: String,
    /// Unix time; defaults to one day from now.
    until: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshCommand {
    code_review_ids: Vec<String>,
}

// ── Route builder ────────────────────────────────────────────────────────────

pub fn api_routes() -> Router<ApiState> {
    Router::new()
        .route("/api/code-reviews", get(list_code_reviews))
        .route("/api/code-reviews/discover", post(discover))
        .route("/api/code-reviews/refresh", post(refresh))
        .route("/api/code-reviews/snooze-until-time", post(snooze_until_time))
        .route("/api/code-reviews/snooze-until-mentioned", post(snooze_until_mentioned))
        .route("/api/code-reviews/snooze-until-update", post(snooze_until_update))
        .route("/api/code-reviews/mark-must-review", post(mark_must_review))
        .route(
            "/api/code-reviews/mark-reviewed-delete-on-merge",
            post(mark_reviewed_delete_on_merge),
        )
        .route("/api/code-reviews/mark-visited", post(mark_visited))
        .route("/api/code-reviews/delete", post(delete))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/sync/status", get(sync_status))
        .route("/api/sync/trigger", post(trigger_sync))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn list_code_reviews(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CodeReview>>, ApiErr> {
    let mut reviews = state.store().list().await?;
    if !query.include_deleted {
        reviews.retain(|r| !r.is_deleted());
    }
    reviews.sort_by(|a, b| b.last_changed.cmp(&a.last_changed));
    Ok(Json(reviews))
}

async fn discover(State(state): State<ApiState>) -> Result<Json<DiscoveryReport>, ApiErr> {
    Ok(Json(state.engine.discover().await?))
}

async fn refresh(
    State(state): State<ApiState>,
    Json(cmd): Json<RefreshCommand>,
) -> Result<Json<RefreshReport>, ApiErr> {
    Ok(Json(state.engine.refresh(&cmd.code_review_ids).await?))
}

async fn snooze_until_time(
    State(state): State<ApiState>,
    Json(cmd): Json<SnoozeUntilTimeCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    let until = cmd.until.unwrap_or_else(|| now() + review::DEFAULT_SNOOZE_SECS);
    Ok(Json(
        review::snooze_until_time(state.store(), &cmd.code_review_id, until).await?,
    ))
}

async fn snooze_until_mentioned(
    State(state): State<ApiState>,
    Json(cmd): Json<ReviewCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    Ok(Json(
        review::snooze_until_mentioned(state.store(), &cmd.code_review_id).await?,
    ))
}

async fn snooze_until_update(
    State(state): State<ApiState>,
    Json(cmd): Json<ReviewCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    Ok(Json(
        review::snooze_until_update(&state.engine, &cmd.code_review_id).await?,
    ))
}

async fn mark_must_review(
    State(state): State<ApiState>,
    Json(cmd): Json<ReviewCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    Ok(Json(
        review::mark_must_review(state.store(), &cmd.code_review_id).await?,
    ))
}

async fn mark_reviewed_delete_on_merge(
    State(state): State<ApiState>,
    Json(cmd): Json<ReviewCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    Ok(Json(
        review::mark_reviewed_delete_on_merge(state.store(), &cmd.code_review_id).await?,
    ))
}

async fn mark_visited(
    State(state): State<ApiState>,
    Json(cmd): Json<ReviewCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    Ok(Json(
        review::mark_visited(state.store(), &cmd.code_review_id).await?,
    ))
}

async fn delete(
    State(state): State<ApiState>,
    Json(cmd): Json<ReviewCommand>,
) -> Result<Json<CodeReview>, ApiErr> {
    Ok(Json(review::delete(state.store(), &cmd.code_review_id).await?))
}

async fn get_settings(State(state): State<ApiState>) -> Result<Json<Settings>, ApiErr> {
    Ok(Json(settings::get_settings(state.store()).await?))
}

async fn update_settings(
    State(state): State<ApiState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiErr> {
    Ok(Json(settings::update_settings(state.store(), update).await?))
}

fn sync_handle(state: &ApiState) -> Result<&SyncHandle, ApiErr> {
    state
        .sync_handle
        .as_ref()
        .ok_or_else(|| ApiErr(AppError::internal("Sync engine not running")))
}

async fn sync_status(State(state): State<ApiState>) -> Result<Json<SyncStatus>, ApiErr> {
    Ok(Json(sync_handle(&state)?.status().await))
}

async fn trigger_sync(State(state): State<ApiState>) -> Result<StatusCode, ApiErr> {
    sync_handle(&state)?.trigger_sync().await?;
    Ok(StatusCode::ACCEPTED)
}
