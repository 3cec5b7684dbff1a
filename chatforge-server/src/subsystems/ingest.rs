//! Ingest subsystem: resolves the request's tenant id and runs the pipeline.

use std::sync::Arc;

use chatforge_core::embeddings::EmbeddingBackend;
use chatforge_core::error::ChatforgeError;
use chatforge_core::store::{TenantStore, VectorStore};
use chatforge_ingest::{ChunkingConfig, IngestError, IngestReport, IngestStage, IngestionPipeline};
use uuid::Uuid;

#[derive(Clone)]
pub struct IngestService {
    tenants: Arc<dyn TenantStore>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl IngestService {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            tenants,
            embedder,
            store,
            chunking,
        }
    }

    /// Checked in order: id present, embedder configured, tenant exists.
    pub async fn ingest(&self, raw_tenant_id: Option<&str>) -> Result<IngestReport, IngestError> {
        let raw = raw_tenant_id.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(loading_error(ChatforgeError::Validation(
                "tenantId is required".to_string(),
            )));
        }

        let Some(embedder) = self.embedder.clone() else {
            return Err(loading_error(ChatforgeError::Configuration(
                "Embedding API key not configured".to_string(),
            )));
        };

        let tenant_id = Uuid::parse_str(raw)
            .map_err(|_| loading_error(ChatforgeError::NotFound("Chatbot not found".to_string())))?;

        tracing::info!(tenant_id = %tenant_id, "Starting ingestion");

        let pipeline = IngestionPipeline::new(
            self.tenants.clone(),
            embedder,
            self.store.clone(),
            self.chunking,
        );

        let result = pipeline.ingest(tenant_id).await;
        if let Err(e) = &result {
            tracing::error!(tenant_id = %tenant_id, stage = %e.stage, error = %e.source, "Ingestion failed");
        }
        result
    }
}

fn loading_error(source: ChatforgeError) -> IngestError {
    IngestError {
        stage: IngestStage::Loading,
        source,
    }
}
