//! HTTP surface: enqueue ingestions, retrieve stored stats.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::ingest::parse_message_batch;
use crate::models::RetrievalRequest;
use crate::retrieval::{RetrievalResponse, RetrievalService};

#[derive(Clone)]
pub struct AppState {
    pub queue: mpsc::Sender<String>,
    pub retrieval: Arc<RetrievalService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/post-match/start", post(start_ingestion))
        .route("/api/post-match/retrieve", post(retrieve_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Accepts the same bodies the queue carries: one request or an array.
async fn start_ingestion(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let requests = parse_message_batch(std::slice::from_ref(&body))
        .map_err(|e| ApiError::BadRequest(format!("{:#}", e)))?;
    if requests.is_empty() {
        return Err(ApiError::BadRequest("no ingestion request in body".to_string()));
    }
    for request in &requests {
        if request.review_id.is_empty() {
            return Err(ApiError::BadRequest("reviewId is required".to_string()));
        }
    }

    state
        .queue
        .send(body)
        .await
        .map_err(|_| ApiError::Unavailable)?;
    debug!(queued = requests.len(), "ingestion enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            queued: requests.len(),
        }),
    ))
}

async fn retrieve_stats(
    State(state): State<AppState>,
    Json(request): Json<RetrievalRequest>,
) -> Result<Response, ApiError> {
    let retrieval = state.retrieval.retrieve(&request).await?;
    let response = RetrievalResponse::from_retrieval(&retrieval)?;
    let Some(body) = response.body else {
        return Err(ApiError::NotFound("No post match info for review".to_string()));
    };
    Ok((
        [
            (header::CONTENT_TYPE, RetrievalResponse::CONTENT_TYPE),
            (header::CONTENT_ENCODING, RetrievalResponse::CONTENT_ENCODING),
        ],
        Body::from(body),
    )
        .into_response())
}

// ===== Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct QueuedResponse {
    queued: usize,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unavailable,
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("Request failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Ingestion queue is closed".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
