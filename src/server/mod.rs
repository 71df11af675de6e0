// HTTP service
// JSON endpoints for building an index from a directory and asking questions against it
//
// GET  /api/v1/heartbeat                    liveness
// POST /initialize, /api/v1/initialize      {"directory": ...}
// POST /query, /api/v1/query                {"question": ..., "index": ...}


use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::RagError;
use crate::database::VectorIndex;
use crate::history::SessionHistory;
use crate::pipeline::{IndexSource, Pipeline};

/// Errors returned to HTTP clients as `{"error": "<message>"}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(message) => {
                error!("Request failed: {}", message);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(error: RagError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    #[inline]
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Background task failed: {}", error))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// State shared by every handler
pub struct AppState {
    pipeline: Arc<Pipeline>,
    indexes: RwLock<HashMap<String, Arc<dyn VectorIndex>>>,
    /// Most recently initialized index, used when a query names none
    active: RwLock<Option<String>>,
    history: Option<Mutex<SessionHistory>>,
    init_lock: Mutex<()>,
}

impl AppState {
    /// `history` enables replaying previous exchanges in front of each question
    #[inline]
    pub fn new(pipeline: Pipeline, history: Option<SessionHistory>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            indexes: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            history: history.map(Mutex::new),
            init_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub async fn active_index(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    async fn resolve_index(&self, requested: Option<&str>) -> ApiResult<Arc<dyn VectorIndex>> {
        let name = match requested {
            Some(name) => name.to_string(),
            None => self
                .active_index()
                .await
                .ok_or_else(|| ApiError::BadRequest("No index initialized".to_string()))?,
        };

        self.indexes
            .read()
            .await
            .get(&name)
            .map(Arc::clone)
            .ok_or_else(|| ApiError::BadRequest(format!("Index '{}' not initialized", name)))
    }
}

#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
    /// Index to query instead of the active one
    #[serde(default)]
    pub index: Option<String>,
}

/// Build the router with permissive CORS and request tracing
#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/heartbeat", get(heartbeat))
        .route("/initialize", post(initialize))
        .route("/api/v1/initialize", post(initialize))
        .route("/query", post(query))
        .route("/api/v1/query", post(query))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `address` and serve until the process is stopped
#[inline]
pub async fn serve(state: Arc<AppState>, address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[inline]
pub async fn heartbeat() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

#[inline]
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InitializeRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    let directory = request.directory.unwrap_or_default();
    let path = PathBuf::from(&directory);
    if directory.is_empty() || !path.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Directory '{}' not found",
            directory
        )));
    }

    let _guard = state.init_lock.lock().await;
    info!("Initializing index from {}", path.display());

    let pipeline = Arc::clone(&state.pipeline);
    let prepared = tokio::task::spawn_blocking(move || {
        pipeline.prepare_index(&IndexSource::Directory(path), true)
    })
    .await??;

    let name = prepared.index.name().to_string();
    if let Some(report) = &prepared.upload {
        info!("Uploaded {}", report);
    }

    state
        .indexes
        .write()
        .await
        .insert(name.clone(), Arc::from(prepared.index));
    *state.active.write().await = Some(name.clone());

    Ok(Json(json!({
        "message": format!("Index '{}' initialized and embeddings uploaded.", name)
    })))
}

#[inline]
pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    let question = request
        .question
        .filter(|question| !question.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No question provided".to_string()))?;

    let index = state.resolve_index(request.index.as_deref()).await?;
    let pipeline = Arc::clone(&state.pipeline);

    let answer = match &state.history {
        Some(history) => {
            // Held across the model call so exchanges are recorded in order
            let mut history = history.lock().await;
            let composed = history.compose_query(&question);
            let answer = tokio::task::spawn_blocking(move || {
                pipeline.answer(index.as_ref(), &composed)
            })
            .await??;
            history.record(&question, &answer.plain());
            answer
        }
        None => {
            tokio::task::spawn_blocking(move || pipeline.answer(index.as_ref(), &question))
                .await??
        }
    };

    Ok(Json(json!({ "answer": answer.text })))
}
