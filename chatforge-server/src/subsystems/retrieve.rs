//! Retrieval subsystem: tenant-scoped semantic search over the knowledge index
//!
//! - Embeds the customer's message with the configured backend
//! - Queries the vector store for the tenant's live generation
//! - Keeps rows at or above the similarity threshold, best first, top-K
//!
//! Retrieval never fails a chat turn: provider or store errors are logged and
//! the caller gets an empty result, which makes the prompt fall back to the
//! tenant's raw knowledge text.

use chatforge_core::config::RetrievalConfig;
use chatforge_core::embeddings::EmbeddingBackend;
use chatforge_core::models::RetrievalResult;
use chatforge_core::store::VectorStore;
use uuid::Uuid;

pub async fn retrieve_context(
    tenant_id: Uuid,
    query: &str,
    embedder: Option<&dyn EmbeddingBackend>,
    store: &dyn VectorStore,
    config: &RetrievalConfig,
) -> RetrievalResult {
    let query = query.trim();
    if query.is_empty() || config.top_k == 0 {
        return RetrievalResult::empty();
    }

    let Some(embedder) = embedder else {
        tracing::debug!(tenant_id = %tenant_id, "No embedding backend configured; skipping retrieval");
        return RetrievalResult::empty();
    };

    let query_vector = match embedder.embed_query(query).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(tenant_id = %tenant_id, backend = embedder.name(), error = %e, "Failed to embed query; using raw knowledge text");
            return RetrievalResult::empty();
        }
    };

    match store
        .query(tenant_id, &query_vector, config.similarity_threshold, config.top_k)
        .await
    {
        Ok(result) => {
            tracing::debug!(tenant_id = %tenant_id, passages = result.len(), store = store.name(), "Retrieved knowledge passages");
            result
        }
        Err(e) => {
            tracing::warn!(tenant_id = %tenant_id, error = %e, "Vector query failed; using raw knowledge text");
            RetrievalResult::empty()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
