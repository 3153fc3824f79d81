//! HTTP routes and handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use trustline_classifiers::ImageRef;
use trustline_core::{Category, ImageSurface, Severity, Surface};
use trustline_ledger::{EventQuery, ExportFormat, NotificationStatus, UserRef};
use trustline_pipeline::{
    ChatMessageStore, EvaluateRequest, ImageEvaluateRequest, NewChatMessage,
};

use crate::state::AppState;

const MAX_BODY_BYTES: usize = 256 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/evaluate/image", post(evaluate_image))
        .route("/v1/chat/messages", post(send_chat_message))
        .route("/v1/chat/messages/:id", get(get_chat_message))
        .route("/v1/events", get(list_events))
        .route("/v1/events/export", get(export_events))
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/:id/dismiss", post(dismiss_notification))
        .route("/v1/admin/users/:id/suspend", post(suspend_user))
        .route("/v1/admin/users/:id/lift", post(lift_suspension))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn fallback() -> ApiError {
    ApiError::NotFound
}

/// User context every surface passes alongside content
#[derive(Debug, Deserialize)]
struct UserBody {
    id: String,
    nick: String,
    tutor_email: String,
}

impl From<UserBody> for UserRef {
    fn from(body: UserBody) -> Self {
        UserRef::new(body.id, body.nick, body.tutor_email)
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateBody {
    user: UserBody,
    text: String,
    surface: Surface,
    #[serde(default)]
    context: Vec<String>,
    #[serde(default)]
    target_user_id: Option<String>,
}

async fn evaluate(
    State(state): State<AppState>,
    Json(body): Json<EvaluateBody>,
) -> Result<Response, ApiError> {
    let mut request = EvaluateRequest::new(body.user.into(), body.text, body.surface)
        .with_context(body.context);
    if let Some(target) = body.target_user_id {
        request = request.with_target(target);
    }

    let result = state.pipeline.evaluate(request).await?;
    Ok(Json(result).into_response())
}

#[derive(Debug, Deserialize)]
struct EvaluateImageBody {
    user: UserBody,
    image_url: String,
    surface: ImageSurface,
    #[serde(default = "default_true")]
    check_text: bool,
}

fn default_true() -> bool {
    true
}

async fn evaluate_image(
    State(state): State<AppState>,
    Json(body): Json<EvaluateImageBody>,
) -> Result<Response, ApiError> {
    let result = state
        .pipeline
        .evaluate_image(ImageEvaluateRequest {
            user: body.user.into(),
            image: ImageRef::Url(body.image_url),
            surface: body.surface,
            check_text: body.check_text,
        })
        .await?;
    Ok(Json(result).into_response())
}

#[derive(Debug, Deserialize)]
struct SendMessageBody {
    sender: UserBody,
    #[serde(default)]
    target_user_id: Option<String>,
    text: String,
    #[serde(default)]
    context: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageResponse {
    message_id: String,
    status: &'static str,
}

async fn send_chat_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageBody>,
) -> Result<Response, ApiError> {
    // Surfaces must not accept writes from suspended accounts at all; the
    // gate runs before the message is persisted.
    let now = Utc::now();
    let profile = state.store.profile(&body.sender.id).await?;
    if let Some(until) = profile.suspended_until {
        if until > now {
            let result = trustline_core::ModerationResult::suspended(until, now);
            return Ok((StatusCode::FORBIDDEN, Json(result)).into_response());
        }
    }

    let receipt = state
        .coordinator
        .send_then_verify(NewChatMessage {
            sender: body.sender.into(),
            target_user_id: body.target_user_id,
            text: body.text,
            context: body.context,
        })
        .await?;

    // Verification continues detached; the sender gets the receipt now.
    drop(receipt.verification);

    Ok(Json(SendMessageResponse {
        message_id: receipt.message_id,
        status: "sent",
    })
    .into_response())
}

async fn get_chat_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.messages.get(&id).await? {
        Some(message) => Ok(Json(message).into_response()),
        None => Err(ApiError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
struct EventsParams {
    user_id: Option<String>,
    category: Option<String>,
    severity: Option<String>,
    allowed: Option<bool>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl EventsParams {
    fn into_query(self) -> Result<EventQuery, ApiError> {
        let mut query = EventQuery::new();
        query.user_id = self.user_id;
        query.allowed = self.allowed;
        query.since = self.since;
        query.until = self.until;
        query.limit = self.limit;
        query.offset = self.offset;

        if let Some(ref label) = self.category {
            query.category = Some(Category::parse(label).ok_or_else(|| {
                ApiError::InvalidRequest(format!("unknown category: {}", label))
            })?);
        }
        if let Some(ref label) = self.severity {
            query.min_severity = Some(Severity::parse(label).ok_or_else(|| {
                ApiError::InvalidRequest(format!("unknown severity: {}", label))
            })?);
        }

        Ok(query)
    }
}

async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let events = state.store.events(&query).await?;
    Ok(Json(events).into_response())
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    #[serde(default = "default_format")]
    format: String,
}

fn default_format() -> String {
    "jsonl".to_string()
}

async fn export_events(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
    Query(event_params): Query<EventsParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)
        .ok_or_else(|| ApiError::InvalidRequest(format!("unknown format: {}", params.format)))?;
    let query = event_params.into_query()?;

    let content = state
        .journal
        .export_string(&query, format)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::JsonLines => "application/x-ndjson",
        ExportFormat::Csv => "text/csv",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], content).into_response())
}

#[derive(Debug, Deserialize)]
struct NotificationsParams {
    status: Option<String>,
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationsParams>,
) -> Result<Response, ApiError> {
    let status = match params.status.as_deref() {
        None => None,
        Some("queued") => Some(NotificationStatus::Queued),
        Some("sent") => Some(NotificationStatus::Sent),
        Some("failed") => Some(NotificationStatus::Failed),
        Some("dismissed") => Some(NotificationStatus::Dismissed),
        Some(other) => {
            return Err(ApiError::InvalidRequest(format!(
                "unknown status: {}",
                other
            )))
        }
    };

    Ok(Json(state.queue.list(status)).into_response())
}

async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if state.queue.dismiss(&id) {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Debug, Deserialize)]
struct SuspendBody {
    nick: String,
    tutor_email: String,
    #[serde(default = "default_suspend_reason")]
    reason: String,
}

fn default_suspend_reason() -> String {
    "administrative action".to_string()
}

async fn suspend_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SuspendBody>,
) -> Result<Response, ApiError> {
    let user = UserRef::new(id.clone(), body.nick, body.tutor_email);
    let until = state.engine.suspend(&user, body.reason).await?;

    info!(user = %id, "account suspended by admin");
    Ok(Json(json!({ "user_id": id, "suspended_until": until })).into_response())
}

async fn lift_suspension(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.engine.lift(&id).await?;

    info!(user = %id, "suspension lifted by admin");
    Ok(Json(json!({ "user_id": id, "suspended_until": null })).into_response())
}

/// Error handling
#[derive(Debug)]
enum ApiError {
    InvalidRequest(String),
    NotFound,
    Internal(String),
}

impl From<trustline_core::Error> for ApiError {
    fn from(err: trustline_core::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = json!({
            "error": {
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
