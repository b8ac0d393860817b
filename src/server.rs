//! JSON HTTP API.
//!
//! Exposes session management, document ingestion, similarity
//! comparison, and question answering over HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sessions` | Create a session |
//! | `GET`  | `/sessions` | List sessions |
//! | `GET`  | `/sessions/{id}` | Fetch one session |
//! | `PUT`  | `/sessions/{id}` | Update session metadata |
//! | `DELETE` | `/sessions/{id}` | Delete a session (cascade) |
//! | `POST` | `/sessions/{id}/documents` | Upload and auto-bucket a document |
//! | `GET`  | `/sessions/{id}/documents` | List a session's documents |
//! | `GET`  | `/sessions/{id}/buckets` | Per-bucket statistics |
//! | `GET`  | `/documents/{id}` | Document record and processing status |
//! | `POST` | `/sessions/{id}/questions` | Ask a question over the session |
//! | `POST` | `/similarity` | Score two raw texts |
//! | `GET`  | `/namespaces` | List vector-index namespaces |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Document uploads carry the payload as base64 in a JSON body rather
//! than multipart form data.
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::registry::{SessionRegistry, SessionUpdate};
use crate::similarity::SimilarityMethod;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
}

/// Start the HTTP server on `bind`, serving until the process exits.
pub async fn run_server(registry: Arc<SessionRegistry>, bind: &str) -> anyhow::Result<()> {
    let state = AppState { registry };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(
            "/sessions",
            post(handle_create_session).get(handle_list_sessions),
        )
        .route(
            "/sessions/{id}",
            get(handle_get_session)
                .put(handle_update_session)
                .delete(handle_delete_session),
        )
        .route(
            "/sessions/{id}/documents",
            post(handle_upload_document).get(handle_list_documents),
        )
        .route("/sessions/{id}/buckets", get(handle_bucket_stats))
        .route("/documents/{id}", get(handle_get_document))
        .route("/sessions/{id}/questions", post(handle_question))
        .route("/similarity", post(handle_similarity))
        .route("/namespaces", get(handle_namespaces))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("corral server listening on http://{}", bind);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
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

/// Map a registry error to the most appropriate HTTP status.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("not found") || msg.contains("Not found") {
        not_found(msg)
    } else if msg.contains("must be")
        || msg.contains("must not")
        || msg.contains("Unknown")
        || msg.contains("unsupported")
        || msg.contains("invalid")
    {
        bad_request(msg)
    } else {
        internal(msg)
    }
}

// ============ Health ============

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

// ============ Sessions ============

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    similarity_threshold: Option<f64>,
    #[serde(default)]
    preprocessing: Option<String>,
    #[serde(default)]
    preprocessing_model: Option<String>,
}

async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    if let Some(t) = req.similarity_threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(bad_request("similarity_threshold must be in [0.0, 1.0]"));
        }
    }

    let session = state
        .registry
        .create_session(
            &req.name,
            req.description,
            req.similarity_threshold,
            req.preprocessing,
            req.preprocessing_model,
        )
        .await
        .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "session": session })))
}

async fn handle_list_sessions(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sessions = state.registry.list_sessions().await.map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state.registry.get_session(&id).await.map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "session": session })))
}

async fn handle_update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<SessionUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state
        .registry
        .update_session(&id, update)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "session": session })))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let report = state
        .registry
        .delete_session(&id)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "report": report })))
}

// ============ Documents ============

#[derive(Deserialize)]
struct UploadRequest {
    filename: String,
    /// Base64-encoded payload bytes.
    content_base64: String,
}

async fn handle_upload_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.filename.trim().is_empty() {
        return Err(bad_request("filename must not be empty"));
    }
    let content = base64::engine::general_purpose::STANDARD
        .decode(&req.content_base64)
        .map_err(|e| bad_request(format!("content_base64 is invalid: {}", e)))?;

    let (document, assignment) = state
        .registry
        .ingest_document(&id, &req.filename, &content)
        .await
        .map_err(classify_error)?;

    Ok(Json(serde_json::json!({
        "document": document,
        "assignment": assignment,
    })))
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let documents = state
        .registry
        .session_documents(&id)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "documents": documents })))
}

async fn handle_bucket_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let buckets = state.registry.bucket_stats(&id).await.map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "buckets": buckets })))
}

/// Fetch a document record, including its processing status.
async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let document = state.registry.get_document(&id).await.map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "document": document })))
}

// ============ Questions ============

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    model: Option<String>,
}

async fn handle_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let answer = state
        .registry
        .ask(&id, &req.question, req.top_k, req.model.as_deref())
        .await
        .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "result": answer })))
}

// ============ Similarity ============

#[derive(Deserialize)]
struct SimilarityRequest {
    text_a: String,
    text_b: String,
    #[serde(default)]
    method: Option<String>,
}

async fn handle_similarity(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let method = req
        .method
        .as_deref()
        .unwrap_or("hybrid")
        .parse::<SimilarityMethod>()
        .map_err(|e| bad_request(e.to_string()))?;

    let result = state
        .registry
        .compare_texts(&req.text_a, &req.text_b, method)
        .await
        .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "result": result })))
}

// ============ Namespaces ============

async fn handle_namespaces(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let namespaces = state
        .registry
        .list_namespaces()
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "namespaces": namespaces })))
}
