use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::request::Parts,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::ApiError;
use crate::handlers::{AddEntryRequest, AnalysisHandler, AnalysisResponse, ConfirmRequest, LogHandler, StatsHandler};
use crate::models::{DailyLog, DayStats, StatsSummary};

/// Set by the authenticating gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

// Room for multipart boundaries and headers around the image
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct AppState {
    pub analysis: Arc<AnalysisHandler>,
    pub logs: Arc<LogHandler>,
    pub stats: Arc<StatsHandler>,
}

/// Requester identity, already authenticated upstream.
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| AuthenticatedUser(value.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

pub fn create_router(state: AppState, max_image_bytes: usize) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/ai/analyze", post(analyze_handler))
        .route("/api/ai/recognitions/:id/confirm", post(confirm_handler))
        .route("/api/logs", post(add_entry_handler))
        .route("/api/logs/:date", get(get_log_handler))
        .route("/api/logs/:date/:entry_id", delete(remove_entry_handler))
        .route("/api/stats/weekly", get(weekly_stats_handler))
        .route("/api/stats/summary", get(stats_summary_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_image_bytes.saturating_add(MULTIPART_OVERHEAD)))
        .with_state(state)
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() == Some("image") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {}", e)))?;
            image = Some(data.to_vec());
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("Please upload an image".to_string()))?;
    let response = state.analysis.analyze_and_record(&user_id, image).await?;

    Ok(Json(response))
}

async fn confirm_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(recognition_id): Path<i64>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<DailyLog>, ApiError> {
    let log = state.analysis.confirm(&user_id, recognition_id, request).await?;
    Ok(Json(log))
}

async fn get_log_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(date): Path<NaiveDate>,
) -> Result<Json<DailyLog>, ApiError> {
    let log = state.logs.get_daily_log(&user_id, date).await?;
    Ok(Json(log))
}

async fn add_entry_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<AddEntryRequest>,
) -> Result<(axum::http::StatusCode, Json<DailyLog>), ApiError> {
    let log = state.logs.add_entry(&user_id, request).await?;
    Ok((axum::http::StatusCode::CREATED, Json(log)))
}

async fn remove_entry_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path((date, entry_id)): Path<(NaiveDate, i64)>,
) -> Result<Json<DailyLog>, ApiError> {
    let log = state.logs.remove_entry(&user_id, date, entry_id).await?;
    Ok(Json(log))
}

async fn weekly_stats_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<DayStats>>, ApiError> {
    Ok(Json(state.stats.weekly(&user_id).await?))
}

async fn stats_summary_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<StatsSummary>, ApiError> {
    Ok(Json(state.stats.summary(&user_id).await?))
}

async fn root_handler() -> &'static str {
    "Nutrition Tracker API - POST /api/ai/analyze to recognize a meal photo"
}

async fn health_check() -> &'static str {
    "OK"
}
