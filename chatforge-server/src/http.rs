//! Chatforge HTTP REST API
//!
//! Axum-based HTTP server in front of the chat and ingestion subsystems. Every
//! route answers CORS pre-flight so the widget can be embedded on any site.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health  : health check with store status (`?tenantId=` adds index size)
//! - GET  /version : server version info
//! - POST /chat    : one chat turn (tenant or inline variant)
//! - POST /ingest  : rebuild a tenant's knowledge index

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatforge_core::completion::CompletionGateway;
use chatforge_core::embeddings::EmbeddingBackend;
use chatforge_core::error::ChatforgeError;
use chatforge_core::store::{TenantStore, VectorStore};
use chatforge_core::ChatforgeConfig;
use chatforge_ingest::ChunkingConfig;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::subsystems::chat::{ChatRequest, ChatService};
use crate::subsystems::ingest::IngestService;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub config: ChatforgeConfig,
    /// `None` when running on in-memory stores.
    pub pool: Option<PgPool>,
    pub store_name: String,
    pub embedding_enabled: bool,
    pub notifications_enabled: bool,
    pub vectors: Arc<dyn VectorStore>,
    pub chat: ChatService,
    pub ingest: IngestService,
}

impl HttpState {
    pub fn new(
        config: ChatforgeConfig,
        pool: Option<PgPool>,
        tenants: Arc<dyn TenantStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        gateway: CompletionGateway,
    ) -> Self {
        let store_name = vectors.name().to_string();
        let embedding_enabled = embedder.is_some();
        let notifications_enabled = gateway.has_notifier();

        let ingest = IngestService::new(
            tenants.clone(),
            embedder.clone(),
            vectors.clone(),
            ChunkingConfig::from(&config.retrieval),
        );
        let chat = ChatService::new(
            tenants,
            vectors.clone(),
            embedder,
            gateway,
            config.retrieval.clone(),
        );

        Self {
            config,
            pool,
            store_name,
            embedding_enabled,
            notifications_enabled,
            vectors: vectors.clone(),
            chat,
            ingest,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/chat", post(chat_handler))
        .route("/ingest", post(ingest_handler))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Chatforge HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthQuery {
    #[serde(alias = "chatbotId")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(alias = "chatbotId")]
    pub tenant_id: Option<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check. With a database attached, reports Postgres and
/// pgvector versions; 503 when the database is unreachable. With a tenant id,
/// also reports how many chunks that tenant's live index holds.
pub async fn health_inner(
    state: &HttpState,
    tenant_id: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut body = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store_name,
        "embedding": state.embedding_enabled,
        "notifications": state.notifications_enabled,
    });

    if let Some(raw) = tenant_id.map(str::trim).filter(|t| !t.is_empty()) {
        let Ok(id) = Uuid::parse_str(raw) else {
            return error_body(StatusCode::BAD_REQUEST, "Invalid tenantId");
        };
        match state.vectors.count(id).await {
            Ok(n) => body["indexedChunks"] = serde_json::json!(n),
            Err(e) => {
                tracing::error!(tenant_id = %id, error = %e, "Failed to count indexed chunks");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({
                        "status": "unhealthy",
                        "error": e.to_string(),
                    }),
                );
            }
        }
        body["tenantId"] = serde_json::json!(id);
    }

    let Some(pool) = &state.pool else {
        return (StatusCode::OK, body);
    };

    let pg_ver = match chatforge_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    let pgvector_ver = match chatforge_core::db::check_pgvector(pool).await {
        Ok(v) => v,
        Err(e) => format!("unavailable: {}", e),
    };

    body["postgresql"] = serde_json::json!(pg_ver);
    body["pgvector"] = serde_json::json!(pgvector_ver);
    (StatusCode::OK, body)
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "chatforge",
    })
}

/// Inner chat: parses either request variant and runs one turn.
///
/// Failures carry a user-safe message; provider detail only reaches the log.
pub async fn chat_inner(
    chat: &ChatService,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request: ChatRequest = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected malformed chat request");
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("Invalid chat request: {}", e),
            );
        }
    };

    match chat.handle(request).await {
        Ok(response) => (
            StatusCode::OK,
            serde_json::json!({ "response": response }),
        ),
        Err(e) => {
            log_chat_error(&e);
            error_body(status_of(&e), e.public_message())
        }
    }
}

/// Inner ingest: rebuilds the tenant's index and reports the outcome.
pub async fn ingest_inner(
    ingest: &IngestService,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request: IngestRequest = serde_json::from_value(payload).unwrap_or_default();

    match ingest.ingest(request.tenant_id.as_deref()).await {
        Ok(report) => match report.generation {
            Some(generation) => (
                StatusCode::OK,
                serde_json::json!({
                    "insertedCount": report.inserted_count,
                    "generation": generation,
                }),
            ),
            None => (
                StatusCode::OK,
                serde_json::json!({
                    "insertedCount": 0,
                    "message": "No knowledge text to ingest",
                }),
            ),
        },
        Err(e) => (
            status_of(&e.source),
            serde_json::json!({
                "error": e.source.to_string(),
                "stage": e.stage,
                "status": "error",
            }),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<HealthQuery>,
) -> impl IntoResponse {
    let (status, body) = health_inner(&state, query.tenant_id.as_deref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state.chat, payload).await;
    (status, Json(body))
}

pub async fn ingest_handler(
    State(state): State<Arc<HttpState>>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    let (status, body) = ingest_inner(&state.ingest, payload).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

fn status_of(e: &ChatforgeError) -> StatusCode {
    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_body(status: StatusCode, msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    let body = serde_json::to_value(ErrorResponse::new(msg))
        .unwrap_or_else(|_| serde_json::json!({ "error": "Internal server error" }));
    (status, body)
}

fn log_chat_error(e: &ChatforgeError) {
    match e {
        ChatforgeError::Validation(_) | ChatforgeError::NotFound(_) => {
            tracing::debug!(error = %e, "Chat request rejected")
        }
        _ => tracing::error!(error = %e, "Chat turn failed"),
    }
}

// ============================================================================
// Unit Tests (inner functions called directly)
// ============================================================================
