//! Document-chat HTTP server.
//!
//! Exposes the upload, listing, analytics, and query pipeline as a JSON HTTP
//! API for browser frontends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload: `clientId` field plus one or more files |
//! | `GET`  | `/documents` | List a client's documents |
//! | `GET`  | `/documents/content` | Full text of one document |
//! | `DELETE` | `/documents/delete` | Remove one document |
//! | `GET`  | `/analytics` | Aggregate statistics for a client |
//! | `POST` | `/query` | Retrieval-augmented chat; streams the answer as plain text |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Client ID is required and cannot be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream_error` (500),
//! `internal` (500). Upstream failures name the dependency that failed; the
//! underlying cause is logged server-side and never echoed to the caller.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::analytics::build_analytics;
use crate::chat::{build_messages, CompletionClient};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::Error;
use crate::ingest::{Ingestor, UploadedFile};
use crate::models::ChatMessage;
use crate::retrieve::{build_context_block, retrieve_context};
use crate::store::{local::LocalStore, managed::ManagedStore, DocumentStore};
use crate::tenant::validate_client_id;
use crate::vector_index::VectorIndex;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    ingestor: Arc<Ingestor>,
    /// Absent when `OPENAI_API_KEY` is not set; uploads degrade and queries
    /// are rejected.
    embedder: Option<Arc<EmbeddingClient>>,
    vectors: Arc<VectorIndex>,
    completion: Option<Arc<CompletionClient>>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. All upstream clients share one connection pool.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let config = Arc::new(config.clone());

    let store: Arc<dyn DocumentStore> = match config.storage.backend.as_str() {
        "managed" => {
            let managed = config
                .managed
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("[managed] section missing"))?;
            Arc::new(ManagedStore::new(http.clone(), managed)?)
        }
        _ => Arc::new(LocalStore::new(config.storage.data_dir.clone())),
    };

    let embedder = if config.embedding.is_enabled() {
        Some(Arc::new(EmbeddingClient::new(
            http.clone(),
            &config.embedding,
        )?))
    } else {
        info!("OPENAI_API_KEY not set; running without embeddings");
        None
    };

    let completion = config.embedding.api_key.clone().map(|key| {
        Arc::new(CompletionClient::new(http.clone(), &config.completion, key))
    });

    let vectors = Arc::new(VectorIndex::new(http.clone(), &config.vector_store));

    // The chunk dump written when embeddings are unavailable only makes
    // sense on local disk.
    let fallback_dir = (config.storage.backend == "local")
        .then(|| config.storage.data_dir.clone());

    let ingestor = Arc::new(Ingestor::new(
        &config.chunking,
        store.clone(),
        embedder.clone(),
        vectors.clone(),
        fallback_dir,
    )?);

    let state = AppState {
        config: config.clone(),
        store,
        ingestor,
        embedder,
        vectors,
        completion,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state).layer(cors);

    info!("listening on http://{}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(handle_upload))
        .route("/documents", get(handle_list_documents))
        .route("/documents/content", get(handle_document_content))
        .route("/documents/delete", delete(handle_delete_document))
        .route("/analytics", get(handle_analytics))
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest(message) => bad_request(message),
            Error::NoDocuments(_) | Error::NotFound(_) => not_found(err.to_string()),
            Error::Upstream {
                dependency,
                message,
            } => {
                // The cause stays in the log; the caller only learns which
                // dependency failed.
                error!(dependency = dependency.name(), cause = %message, "upstream dependency failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "upstream_error".to_string(),
                    message: format!("{dependency} request failed"),
                }
            }
            Error::Internal(cause) => {
                error!(cause = %cause, "internal error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: "Internal server error".to_string(),
                }
            }
        }
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

// ============ POST /upload ============

/// Handler for `POST /upload`.
///
/// Expects multipart form data with a `clientId` text field and one or more
/// file fields. All files are validated before anything is persisted; a
/// request with any disallowed file is rejected whole.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut client_id: Option<String> = None;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart request: {e}")))?
    {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Failed to read uploaded file: {e}")))?;
            files.push(UploadedFile {
                name: file_name,
                bytes: bytes.to_vec(),
            });
        } else if field.name() == Some("clientId") {
            let text = field
                .text()
                .await
                .map_err(|e| bad_request(format!("Malformed clientId field: {e}")))?;
            client_id = Some(text);
        }
    }

    let client_id = client_id.ok_or_else(|| bad_request("Client ID is required and cannot be empty"))?;
    let report = state.ingestor.ingest(&client_id, files).await?;
    Ok(Json(report))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct ClientQuery {
    #[serde(rename = "clientId")]
    client_id: String,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<crate::models::DocumentInfo>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = validate_client_id(&query.client_id)?;
    let documents = state.store.list(&client_id).await?;
    Ok(Json(DocumentListResponse { documents }))
}

// ============ GET /documents/content ============

#[derive(Deserialize)]
struct DocumentQuery {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "fileName")]
    file_name: String,
}

#[derive(Serialize)]
struct DocumentContentResponse {
    #[serde(rename = "fileName")]
    file_name: String,
    content: String,
}

async fn handle_document_content(
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = validate_client_id(&query.client_id)?;
    crate::store::validate_file_name(&query.file_name)?;
    let content = state.store.content(&client_id, &query.file_name).await?;
    Ok(Json(DocumentContentResponse {
        file_name: query.file_name,
        content,
    }))
}

// ============ DELETE /documents/delete ============

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
}

/// Handler for `DELETE /documents/delete`.
///
/// Removes one document from the store. The tenant's vector collection is
/// rebuilt on the next upload; deletion alone does not touch the index.
async fn handle_delete_document(
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = validate_client_id(&query.client_id)?;
    crate::store::validate_file_name(&query.file_name)?;
    state.store.delete(&client_id, &query.file_name).await?;
    info!(client = %client_id, file = %query.file_name, "document deleted");
    Ok(Json(DeleteResponse {
        message: "File deleted successfully".to_string(),
    }))
}

// ============ GET /analytics ============

async fn handle_analytics(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = validate_client_id(&query.client_id)?;
    let analytics = build_analytics(state.store.as_ref(), &client_id).await?;
    Ok(Json(analytics))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(rename = "clientId")]
    client_id: String,
    /// Full conversation, oldest first. The last entry is the question.
    messages: Vec<ChatMessage>,
}

/// Handler for `POST /query`.
///
/// Runs retrieval over the tenant's collection, folds the hits and the prior
/// conversation into the prompt, and streams the model's answer back as
/// plain text chunks.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(embedder), Some(completion)) = (&state.embedder, &state.completion) else {
        return Err(bad_request(
            "OPENAI_API_KEY not set - AI chat requires embeddings",
        ));
    };

    let Some((question, history)) = request.messages.split_last() else {
        return Err(bad_request("Messages are required and cannot be empty"));
    };
    if question.role != "user" {
        return Err(bad_request("Last message must be from the user"));
    }

    let chunks = retrieve_context(
        embedder,
        &state.vectors,
        &request.client_id,
        &question.content,
        state.config.retrieval.top_k,
    )
    .await?;

    let context = build_context_block(&chunks);
    let messages = build_messages(&context, history, &question.content);
    let tokens = completion.stream(messages).await?;

    let body = Body::from_stream(futures_util::StreamExt::map(tokens, |item| {
        item.map(bytes::Bytes::from)
            .map_err(|e| std::io::Error::other(e.to_string()))
    }));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(body)
        .map_err(|e| Error::Internal(e.into()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Dependency;
    use tempfile::TempDir;

    fn test_state(tmp: &TempDir, with_credential: bool) -> AppState {
        let mut config: Config = toml::from_str("").unwrap();
        config.storage.data_dir = tmp.path().to_path_buf();
        if with_credential {
            config.embedding.api_key = Some("test-key".to_string());
            // Nowhere to connect to; these tests must fail before any
            // network call.
            config.embedding.base_url = "http://127.0.0.1:1".to_string();
            config.vector_store.url = "http://127.0.0.1:1".to_string();
        }

        let http = reqwest::Client::new();
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::new(tmp.path()));
        let vectors = Arc::new(VectorIndex::new(http.clone(), &config.vector_store));
        let embedder = if config.embedding.is_enabled() {
            Some(Arc::new(
                EmbeddingClient::new(http.clone(), &config.embedding).unwrap(),
            ))
        } else {
            None
        };
        let completion = config
            .embedding
            .api_key
            .clone()
            .map(|key| Arc::new(CompletionClient::new(http.clone(), &config.completion, key)));
        let ingestor = Arc::new(
            Ingestor::new(
                &config.chunking,
                store.clone(),
                embedder.clone(),
                vectors.clone(),
                Some(tmp.path().to_path_buf()),
            )
            .unwrap(),
        );

        AppState {
            config: Arc::new(config),
            store,
            ingestor,
            embedder,
            vectors,
            completion,
        }
    }

    fn message(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    async fn query_error(state: AppState, request: QueryRequest) -> AppError {
        match handle_query(State(state), Json(request)).await {
            Ok(_) => panic!("expected the request to be rejected"),
            Err(err) => err,
        }
    }

    #[tokio::test]
    async fn test_query_without_credential_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = query_error(
            test_state(&tmp, false),
            QueryRequest {
                client_id: "acme".to_string(),
                messages: vec![message("user", "hello")],
            },
        )
        .await;
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_query_empty_messages_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = query_error(
            test_state(&tmp, true),
            QueryRequest {
                client_id: "acme".to_string(),
                messages: vec![],
            },
        )
        .await;
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Messages"));
    }

    #[tokio::test]
    async fn test_query_non_user_last_message_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = query_error(
            test_state(&tmp, true),
            QueryRequest {
                client_id: "acme".to_string(),
                messages: vec![
                    message("user", "hello"),
                    message("assistant", "hi, how can I help?"),
                ],
            },
        )
        .await;
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Last message"));
    }

    #[test]
    fn test_invalid_request_maps_to_400() {
        let app_err: AppError = Error::invalid("bad input").into();
        assert_eq!(app_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(app_err.code, "bad_request");
        assert_eq!(app_err.message, "bad input");
    }

    #[test]
    fn test_no_documents_maps_to_404_with_client_in_message() {
        let app_err: AppError = Error::NoDocuments("abc".to_string()).into();
        assert_eq!(app_err.status, StatusCode::NOT_FOUND);
        assert!(app_err.message.contains("No documents found for client 'abc'"));
    }

    #[test]
    fn test_upstream_maps_to_500_naming_dependency_only() {
        let app_err: AppError =
            Error::upstream(Dependency::VectorStore, "connection refused to 10.0.0.5").into();
        assert_eq!(app_err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app_err.code, "upstream_error");
        assert!(app_err.message.contains("vector store"));
        // The transport detail stays out of the response body.
        assert!(!app_err.message.contains("10.0.0.5"));
    }

    #[test]
    fn test_internal_maps_to_generic_500() {
        let app_err: AppError = Error::Internal(anyhow::anyhow!("disk exploded")).into();
        assert_eq!(app_err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app_err.message, "Internal server error");
    }
}
