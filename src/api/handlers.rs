//! HTTP handlers for the learning API

use crate::knowledge::{normalize_topic, Fact};
use crate::learning::{FailureReason, LearningAnswer, LearningCoordinator, LearningStats};
use crate::metrics::METRICS;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<LearningCoordinator>,
}

/// API error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct LearnRequest {
    pub query: String,
    /// User language; defaults to the canonical language
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicResponse {
    pub topic: String,
    pub facts: Vec<Fact>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Learn about a query
///
/// POST /api/v1/learn
pub async fn learn(
    State(state): State<AppState>,
    Json(request): Json<LearnRequest>,
) -> ApiResult<LearningAnswer> {
    info!("Learn request: query={}", request.query);

    let language = request
        .language
        .unwrap_or_else(|| state.coordinator.config().canonical_language.clone());

    let result = crate::time_operation!(
        METRICS.http_request_duration,
        "learn",
        state.coordinator.handle_query(&request.query, &language).await
    );

    match result {
        Ok(answer) => Ok(Json(answer)),
        Err(failure) => {
            let status = match failure.reason {
                FailureReason::EmptyQuery => StatusCode::BAD_REQUEST,
                FailureReason::NoSourcesFound => StatusCode::NOT_FOUND,
                FailureReason::LowReliability => StatusCode::UNPROCESSABLE_ENTITY,
                FailureReason::Internal => {
                    error!("Learning failed internally for query: {}", request.query);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            Err((status, Json(ApiError::new(failure.reason.as_str(), failure.message))))
        }
    }
}

/// Stored facts for a topic
///
/// GET /api/v1/topics/:topic
pub async fn get_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> ApiResult<TopicResponse> {
    let topic = normalize_topic(&topic);
    let facts = state.coordinator.lookup(&topic).await;

    if facts.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new("NOT_FOUND", format!("No facts stored for '{}'", topic))),
        ));
    }

    Ok(Json(TopicResponse { topic, facts }))
}

/// Learning statistics
///
/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<LearningStats> {
    Json(state.coordinator.stats().await)
}

/// Prometheus metrics
///
/// GET /metrics
pub async fn metrics() -> String {
    METRICS.export_prometheus()
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
