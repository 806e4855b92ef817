//! HTTP surface for the document index.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /search` – Embed a query and return the best matching chunks. Accepts `query`, an
//!   optional `top_k` (defaults to `SEARCH_DEFAULT_TOP_K`) and an optional `namespace` filter.
//!   Retrieval failures degrade to an empty `results` list rather than an error status.
//! - `POST /ingest` – Run a full sweep over the configured namespaces and return the run
//!   summary, or `409 Conflict` when a sweep is already in progress.
//! - `POST /documents` – Process one document by `namespace` and `name`; failures are reported.
//! - `GET /status` – Observe counters, recently processed documents, and recorded failures.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools.

use crate::objects::ObjectStoreError;
use crate::processing::{IngestionApi, ProcessedDocument, ProcessingError, SearchResult};
use crate::retrieval::RetrievalService;
use crate::state::StateSnapshot;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Shared handles passed to every handler.
struct AppState<S> {
    ingestion: Arc<S>,
    retrieval: Arc<RetrievalService>,
    default_top_k: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ingestion: Arc::clone(&self.ingestion),
            retrieval: Arc::clone(&self.retrieval),
            default_top_k: self.default_top_k,
        }
    }
}

/// Build the HTTP router exposing retrieval and ingestion triggers.
pub fn create_router<S>(
    ingestion: Arc<S>,
    retrieval: Arc<RetrievalService>,
    default_top_k: usize,
) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/search", post(search_documents::<S>))
        .route("/ingest", post(process_all_documents::<S>))
        .route("/documents", post(process_document::<S>))
        .route("/status", get(get_status::<S>))
        .route("/commands", get(get_commands))
        .with_state(AppState {
            ingestion,
            retrieval,
            default_top_k,
        })
}

/// Request body for the `POST /search` endpoint.
#[derive(Deserialize)]
struct SearchRequest {
    /// Natural-language query text.
    query: String,
    /// Maximum number of results.
    #[serde(default)]
    top_k: Option<usize>,
    /// Restrict matches to one namespace.
    #[serde(default)]
    namespace: Option<String>,
}

/// Response body for the `POST /search` endpoint.
#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn search_documents<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse>
where
    S: IngestionApi,
{
    let top_k = request.top_k.unwrap_or(state.default_top_k);
    let namespace = request
        .namespace
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let results = state
        .retrieval
        .search(&request.query, top_k, namespace)
        .await;
    Json(SearchResponse { results })
}

/// Trigger a full ingestion sweep.
async fn process_all_documents<S>(State(state): State<AppState<S>>) -> Response
where
    S: IngestionApi,
{
    match state.ingestion.try_process_all().await {
        Some(summary) => Json(summary).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "An ingestion run is already in progress" })),
        )
            .into_response(),
    }
}

/// Request body for the `POST /documents` endpoint.
#[derive(Deserialize)]
struct DocumentRequest {
    namespace: String,
    name: String,
}

/// Process a single named document.
async fn process_document<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<ProcessedDocument>, AppError>
where
    S: IngestionApi,
{
    let processed = state
        .ingestion
        .process_document(&request.namespace, &request.name)
        .await?;
    Ok(Json(processed))
}

async fn get_status<S>(State(state): State<AppState<S>>) -> Json<StateSnapshot>
where
    S: IngestionApi,
{
    Json(state.ingestion.state_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "search",
                method: "POST",
                path: "/search",
                description: "Return the chunks most similar to a query, best first, optionally restricted to one namespace.",
                request_example: Some(json!({
                    "query": "notice period for contractors",
                    "top_k": 5,
                    "namespace": "legal"
                })),
            },
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Process every supported document in the configured namespaces and return the run summary.",
                request_example: None,
            },
            CommandDescriptor {
                name: "process_document",
                method: "POST",
                path: "/documents",
                description: "Process one document and return its chunk and embedding counts.",
                request_example: Some(json!({
                    "namespace": "legal",
                    "name": "contracts/nda.pdf"
                })),
            },
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/status",
                description: "Return ingestion counters, recent documents, and recorded failures.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ProcessingError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ProcessingError::ObjectStore(ObjectStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ProcessingError::ObjectStore(ObjectStoreError::InvalidNamespace(_)) => {
                StatusCode::BAD_REQUEST
            }
            ProcessingError::UnsupportedDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self(inner)
    }
}
