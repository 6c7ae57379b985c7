//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/app/search` | Combined multi-modal search |
//! | `POST` | `/app/search-image-similar` | Visual neighbours of one image |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid date provided: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use framefind_core::filter::FilterError;
use framefind_core::fusion::FusedResponse;
use framefind_core::models::ResolvedHit;

use crate::config::Config;
use crate::pipeline::{SearchEngine, SearchRequest};

#[derive(Clone)]
struct AppState {
    engine: Arc<SearchEngine>,
}

/// Build the engine from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(SearchEngine::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "framefind server listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// The application router, separate from binding so it can be served on any
/// listener.
pub fn router(engine: Arc<SearchEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/app/search", post(handle_search))
        .route("/app/search-image-similar", post(handle_similar))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Invalid filter input is the caller's fault; everything else is ours.
fn classify(err: anyhow::Error) -> AppError {
    if let Some(filter_err) = err.downcast_ref::<FilterError>() {
        return bad_request(filter_err.to_string());
    }
    tracing::error!(error = %format!("{:#}", err), "request failed");
    internal(format!("{:#}", err))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /app/search ============

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<FusedResponse>, AppError> {
    let fused = state.engine.search(&request).await.map_err(classify)?;
    Ok(Json(fused))
}

// ============ POST /app/search-image-similar ============

#[derive(Deserialize)]
struct SimilarRequest {
    image_path: String,
}

#[derive(Serialize)]
struct SimilarResponse {
    similar_images: Vec<ResolvedHit>,
}

async fn handle_similar(
    State(state): State<AppState>,
    Json(request): Json<SimilarRequest>,
) -> Result<Json<SimilarResponse>, AppError> {
    if request.image_path.trim().is_empty() {
        return Err(bad_request("image_path must not be empty"));
    }
    let similar_images = state
        .engine
        .similar_images(&request.image_path)
        .await
        .map_err(classify)?;
    if similar_images.is_empty() {
        return Err(not_found("No similar images found"));
    }
    Ok(Json(SimilarResponse { similar_images }))
}
