//! Admin and progress HTTP API.
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `GET|PUT /progress/{subjectId}` (user from the `x-user-id` header)
//! - `GET|POST /templates`, `GET|PUT|DELETE /templates/{id}`
//! - `POST /templates/{id}/trigger`
//! - `GET /jobs`
//! - `GET /channels`, `PUT|DELETE /channels/{id}`, `POST /channels/{id}/test`

use crate::autosave::{ANONYMOUS_USER, ProgressRecord, ProgressStore, ProgressUpdate, SubjectId, USER_HEADER};
use crate::channels::{ChannelId, ChannelRegistry, NotificationChannel, ReminderPayload};
use crate::error::BoardError;
use crate::reminders::{
    JobsOverview, NewTemplate, ReminderService, ReminderTemplate, ScheduledTemplate, TemplateId,
    TemplatePage, TemplatePatch, TriggerResult,
};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

/// Shared state for axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub reminders: Arc<ReminderService>,
    pub progress: ProgressStore,
    pub channels: ChannelRegistry,
}

impl AppState {
    /// State whose channel directory is the one the scheduler dispatches through.
    pub fn new(reminders: Arc<ReminderService>, progress: ProgressStore) -> Self {
        let channels = reminders.scheduler().dispatcher().registry().clone();
        Self {
            reminders,
            progress,
            channels,
        }
    }
}

/// Error response carrying a status and a `{ "error": message }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let status = match &err {
            BoardError::DuplicateKey(_) => StatusCode::CONFLICT,
            BoardError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            BoardError::Validation(_) | BoardError::Channel(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/progress/{subject_id}", get(handle_get_progress).put(handle_put_progress))
        .route("/templates", get(handle_list_templates).post(handle_create_template))
        .route(
            "/templates/{id}",
            get(handle_get_template)
                .put(handle_update_template)
                .delete(handle_delete_template),
        )
        .route("/templates/{id}/trigger", axum::routing::post(handle_trigger))
        .route("/jobs", get(handle_jobs))
        .route("/channels", get(handle_list_channels))
        .route("/channels/{id}", put(handle_put_channel).delete(handle_delete_channel))
        .route("/channels/{id}/test", axum::routing::post(handle_test_channel))
        .with_state(state)
}

fn user_of(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_USER)
        .to_owned()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_get_progress(
    State(state): State<AppState>,
    Path(subject_id): Path<SubjectId>,
    headers: HeaderMap,
) -> Json<Option<ProgressRecord>> {
    Json(state.progress.get(&user_of(&headers), subject_id))
}

async fn handle_put_progress(
    State(state): State<AppState>,
    Path(subject_id): Path<SubjectId>,
    headers: HeaderMap,
    Json(update): Json<ProgressUpdate>,
) -> ApiResult<Json<ProgressRecord>> {
    let record = state
        .progress
        .upsert_async(&user_of(&headers), subject_id, &update)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn handle_list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<TemplatePage> {
    Json(state.reminders.list_templates(query.limit, query.offset))
}

async fn handle_create_template(
    State(state): State<AppState>,
    Json(new): Json<NewTemplate>,
) -> ApiResult<(StatusCode, Json<ScheduledTemplate>)> {
    let created = state.reminders.create_template(new)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn handle_get_template(
    State(state): State<AppState>,
    Path(id): Path<TemplateId>,
) -> ApiResult<Json<ReminderTemplate>> {
    state
        .reminders
        .get_template(id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("template {id} not found")))
}

async fn handle_update_template(
    State(state): State<AppState>,
    Path(id): Path<TemplateId>,
    Json(patch): Json<TemplatePatch>,
) -> ApiResult<Json<ScheduledTemplate>> {
    Ok(Json(state.reminders.update_template(id, patch)?))
}

async fn handle_delete_template(
    State(state): State<AppState>,
    Path(id): Path<TemplateId>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.reminders.delete_template(id)?;
    Ok(Json(serde_json::json!({ "ok": true, "deleted": deleted })))
}

async fn handle_trigger(
    State(state): State<AppState>,
    Path(id): Path<TemplateId>,
) -> ApiResult<Json<TriggerResult>> {
    Ok(Json(state.reminders.trigger_reminder(id).await?))
}

async fn handle_jobs(State(state): State<AppState>) -> Json<JobsOverview> {
    Json(state.reminders.jobs_status())
}

async fn handle_list_channels(State(state): State<AppState>) -> Json<Vec<NotificationChannel>> {
    Json(state.channels.list())
}

async fn handle_put_channel(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
    Json(mut channel): Json<NotificationChannel>,
) -> ApiResult<Json<NotificationChannel>> {
    // The path id is authoritative.
    channel.id = id;
    state.channels.upsert(channel.clone())?;
    Ok(Json(channel))
}

async fn handle_delete_channel(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.channels.remove(id) {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err(ApiError::not_found(format!("channel {id} not found")))
    }
}

async fn handle_test_channel(
    State(state): State<AppState>,
    Path(id): Path<ChannelId>,
) -> ApiResult<Json<serde_json::Value>> {
    let channel = state
        .channels
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("channel {id} not found")))?;
    let payload = ReminderPayload {
        title: format!("Test alert for channel {}", channel.name),
        body: "Reminder channel test".to_owned(),
        metadata: serde_json::json!({ "test": true }),
        template_key: "channel-test".to_owned(),
    };
    let delivered = match state.reminders.scheduler().dispatcher().alerts() {
        Some(alerts) => alerts.alert(&channel, &payload).await,
        None => false,
    };
    Ok(Json(serde_json::json!({ "ok": true, "delivered": delivered })))
}
