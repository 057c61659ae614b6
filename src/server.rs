//! HTTP API server.
//!
//! JSON API over the ingestion pipeline and query orchestrator.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/api/documents/upload` | Upload a document (multipart `file` field) |
//! | `GET`    | `/api/documents` | List ingested documents, newest first |
//! | `GET`    | `/api/documents/{id}` | Fetch one document record |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its vectors |
//! | `POST`   | `/api/rag/chat` | Ask a question (agentic retrieval) |
//! | `POST`   | `/api/rag/search` | Raw similarity search, no model involved |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unsupported file type" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! `/api/rag/chat` never returns an error status for pipeline failures;
//! those collapse into an apologetic answer with an empty source list.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::AgentLoop;
use crate::config::Config;
use crate::db;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::IngestError;
use crate::ingest::IngestPipeline;
use crate::llm::OpenAiChatClient;
use crate::models::{Document, HistoryMessage, QueryAnswer, SearchHit};
use crate::query::QueryEngine;
use crate::retrieval::RetrievalTool;
use crate::store::DocumentStore;
use crate::vector::{QdrantIndex, VectorStore};

/// Score floor for the raw `/api/rag/search` route. Stricter than the
/// agent's threshold: raw search has no model downstream to judge
/// marginal hits.
const RAW_SEARCH_THRESHOLD: f32 = 0.5;

/// Headroom on top of the file ceiling for multipart framing and other
/// form fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Request body cap. Axum's default is 2 MB, well under the configured
/// file ceiling; the cap must sit above it so oversized uploads are
/// rejected by the pipeline's own `TooLarge` check, not a bare 413.
fn upload_body_limit(max_file_size: usize) -> usize {
    max_file_size + MULTIPART_OVERHEAD
}

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<DocumentStore>,
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    pipeline: Arc<IngestPipeline>,
    engine: Arc<QueryEngine>,
}

/// Starts the HTTP server.
///
/// Connects the database, ensures the vector collection exists, wires the
/// pipeline and orchestrator, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();

    let pool = db::connect(&config).await?;
    let store = Arc::new(DocumentStore::new(pool));
    store.init_schema().await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        &config.embedding,
        &config.llm.base_url,
        api_key.clone(),
    )?);
    let vector: Arc<dyn VectorStore> =
        Arc::new(QdrantIndex::new(&config.vector, config.embedding.dims)?);
    vector.ensure_collection().await?;

    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        embedder.clone(),
        vector.clone(),
        config.ingestion.clone(),
    ));

    let chat = Arc::new(OpenAiChatClient::new(&config.llm, api_key)?);
    let retriever = Arc::new(RetrievalTool::new(embedder.clone(), vector.clone()));
    let agent = AgentLoop::new(chat, retriever, config.agent.clone());
    let engine = Arc::new(QueryEngine::new(
        store.clone(),
        agent,
        config.agent.language.clone(),
    ));

    let state = AppState {
        config,
        store,
        embedder,
        vector,
        pipeline,
        engine,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/documents/upload", post(handle_upload))
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/{id}", get(handle_get_document))
        .route("/api/documents/{id}", delete(handle_delete_document))
        .route("/api/rag/chat", post(handle_chat))
        .route("/api/rag/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(upload_body_limit(
            state.config.ingestion.max_file_size,
        )))
        .layer(cors)
        .with_state(state);

    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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

/// Internal error type that converts into an Axum HTTP response.
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

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps ingestion failures onto the HTTP error contract: uploader
/// mistakes become 400, infrastructure faults become 500.
fn classify_ingest_error(err: IngestError) -> AppError {
    if err.is_user_error() {
        bad_request(err.to_string())
    } else {
        internal_error(err.to_string())
    }
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

// ============ POST /api/documents/upload ============

/// Handler for `POST /api/documents/upload`.
///
/// Expects a multipart form with a `file` field carrying the filename.
/// Returns `201` with the stored document record.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .ok_or_else(|| bad_request("file field has no filename"))?
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing 'file' field"))?;

    let document = state
        .pipeline
        .ingest(&filename, &bytes)
        .await
        .map_err(classify_ingest_error)?;

    Ok((StatusCode::CREATED, Json(document)))
}

// ============ GET /api/documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<Document>,
    total: usize,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state
        .store
        .list()
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    let total = documents.len();
    Ok(Json(DocumentListResponse { documents, total }))
}

// ============ GET /api/documents/{id} ============

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    let document = state
        .pipeline
        .get_document(&id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found(format!("no document with id: {}", id)))?;
    Ok(Json(document))
}

// ============ DELETE /api/documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state
        .pipeline
        .delete_document(&id)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    if !deleted {
        return Err(not_found(format!("no document with id: {}", id)));
    }

    Ok(Json(DeleteResponse {
        message: "Document deleted".to_string(),
    }))
}

// ============ POST /api/rag/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<HistoryMessage>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Handler for `POST /api/rag/chat`.
///
/// The orchestrator never fails, so this route only rejects malformed
/// requests; every accepted question gets a 200 with an answer.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let answer = state
        .engine
        .process_query(&request.message, &request.history, request.top_k)
        .await;
    Ok(Json(answer))
}

// ============ POST /api/rag/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
    total: usize,
}

/// Handler for `POST /api/rag/search`.
///
/// Embeds the query and searches the index directly, bypassing the agent.
async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let top_k = request.top_k.unwrap_or(state.config.agent.top_k);

    let vector = state
        .embedder
        .embed(&request.query)
        .await
        .map_err(|e| internal_error(format!("embedding failed: {}", e)))?;

    let results = state
        .vector
        .search(&vector, top_k, RAW_SEARCH_THRESHOLD, None)
        .await
        .map_err(|e| internal_error(format!("search failed: {}", e)))?;

    let total = results.len();
    Ok(Json(SearchResponse { results, total }))
}
