//! Ingestion pipeline: rebuilds one tenant's knowledge index.
//!
//! Stages run in order `Loading → Chunking → Embedding → Replacing`. A failure
//! is reported with the stage it happened in. Nothing is written before
//! `Replacing`, so an earlier failure leaves the live index as it was.

use std::fmt;
use std::sync::Arc;

use chatforge_core::embeddings::{EmbeddingBackend, EmbeddingError};
use chatforge_core::error::ChatforgeError;
use chatforge_core::models::{Chunk, EmbeddingRecord, KNOWLEDGE_TEXT_SOURCE};
use chatforge_core::store::{Generation, StoreError, TenantStore, VectorStore};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::chunker::{chunk_with_limit, ChunkingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Loading,
    Chunking,
    Embedding,
    Replacing,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestStage::Loading => "loading",
            IngestStage::Chunking => "chunking",
            IngestStage::Embedding => "embedding",
            IngestStage::Replacing => "replacing",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
#[error("Ingestion failed during {stage}: {source}")]
pub struct IngestError {
    pub stage: IngestStage,
    #[source]
    pub source: ChatforgeError,
}

impl IngestError {
    fn at(stage: IngestStage, source: impl Into<ChatforgeError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.source.status_code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub inserted_count: usize,
    /// `None` when there was nothing to ingest and the store was not touched.
    pub generation: Option<Generation>,
}

pub struct IngestionPipeline {
    tenants: Arc<dyn TenantStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        embedder: Arc<dyn EmbeddingBackend>,
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

    pub async fn ingest(&self, tenant_id: Uuid) -> Result<IngestReport, IngestError> {
        // Loading
        let tenant = self
            .tenants
            .load(tenant_id)
            .await
            .map_err(|e| IngestError::at(IngestStage::Loading, e))?
            .ok_or_else(|| {
                IngestError::at(
                    IngestStage::Loading,
                    ChatforgeError::NotFound("Chatbot not found".to_string()),
                )
            })?;

        if !tenant.has_knowledge() {
            tracing::info!(tenant_id = %tenant_id, "No knowledge text to ingest");
            return Ok(IngestReport {
                inserted_count: 0,
                generation: None,
            });
        }

        // Chunking
        let texts = chunk_with_limit(&tenant.knowledge_text, &self.chunking);
        tracing::debug!(tenant_id = %tenant_id, stage = %IngestStage::Chunking, chunks = texts.len(), "Chunked knowledge text");
        if texts.is_empty() {
            return Ok(IngestReport {
                inserted_count: 0,
                generation: None,
            });
        }

        // Embedding
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| IngestError::at(IngestStage::Embedding, e))?;

        if vectors.len() != texts.len() {
            return Err(IngestError::at(
                IngestStage::Embedding,
                EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: vectors.len(),
                },
            ));
        }
        tracing::debug!(tenant_id = %tenant_id, stage = %IngestStage::Embedding, backend = self.embedder.name(), "Embedded chunks");

        // Replacing
        let records: Vec<EmbeddingRecord> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (content, vector))| {
                EmbeddingRecord::new(
                    Chunk {
                        tenant_id,
                        seq: i as i32,
                        content,
                        source: KNOWLEDGE_TEXT_SOURCE.to_string(),
                    },
                    vector,
                    &tenant.business_name,
                )
            })
            .collect();

        let generation = self
            .store
            .replace_all(tenant_id, &records)
            .await
            .map_err(|e| match e {
                StoreError::PartialReplace { tenant_id, detail } => IngestError::at(
                    IngestStage::Replacing,
                    ChatforgeError::PartialIngestion {
                        tenant_id: tenant_id.to_string(),
                        detail,
                    },
                ),
                other => IngestError::at(IngestStage::Replacing, other),
            })?;

        tracing::info!(
            tenant_id = %tenant_id,
            inserted = records.len(),
            generation = %generation,
            store = self.store.name(),
            "Ingestion complete"
        );

        Ok(IngestReport {
            inserted_count: records.len(),
            generation: Some(generation),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatforge_core::models::{RetrievalResult, Tenant};
    use chatforge_core::store::{InMemoryTenantStore, InMemoryVectorStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic 4-dim vectors derived from the text bytes.
    struct FakeEmbedder {
        calls: AtomicUsize,
        fail: bool,
        drop_last: bool,
    }

    impl FakeEmbedder {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                drop_last: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Api {
                    code: 503,
                    message: "unavailable".to_string(),
                });
            }
            let mut out: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| {
                    let sum: u32 = t.bytes().map(u32::from).sum();
                    vec![1.0, (sum % 7) as f32, t.len() as f32, 0.5]
                })
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct PartialStore;

    #[async_trait]
    impl VectorStore for PartialStore {
        async fn replace_all(
            &self,
            tenant_id: Uuid,
            _rows: &[EmbeddingRecord],
        ) -> Result<Generation, StoreError> {
            Err(StoreError::PartialReplace {
                tenant_id,
                detail: "expected 2 rows, found 1".to_string(),
            })
        }

        async fn query(
            &self,
            _tenant_id: Uuid,
            _query_vector: &[f32],
            _threshold: f32,
            _top_k: usize,
        ) -> Result<RetrievalResult, StoreError> {
            Ok(RetrievalResult::empty())
        }

        async fn count(&self, _tenant_id: Uuid) -> Result<usize, StoreError> {
            Ok(0)
        }

        fn name(&self) -> &str {
            "partial"
        }
    }

    async fn tenants_with(knowledge: &str) -> (Uuid, Arc<InMemoryTenantStore>) {
        let tenants = Arc::new(InMemoryTenantStore::new());
        let id = Uuid::new_v4();
        tenants
            .insert(id, Tenant::new(id, "Acme").with_knowledge(knowledge))
            .await;
        (id, tenants)
    }

    fn pipeline(
        tenants: Arc<InMemoryTenantStore>,
        embedder: Arc<FakeEmbedder>,
        store: Arc<dyn VectorStore>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(tenants, embedder, store, ChunkingConfig::default())
    }

    #[tokio::test]
    async fn test_ingest_writes_one_row_per_chunk() {
        let (id, tenants) = tenants_with("We ship within 3 days.\n\nReturns within 30 days.").await;
        let store = Arc::new(InMemoryVectorStore::new());
        let p = pipeline(tenants, Arc::new(FakeEmbedder::ok()), store.clone());

        let report = p.ingest(id).await.unwrap();
        assert_eq!(report.inserted_count, 2);
        assert!(report.generation.is_some());
        assert_eq!(
            store.contents(id).await,
            vec!["We ship within 3 days.", "Returns within 30 days."]
        );
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let (id, tenants) = tenants_with("A.\n\nB.\n\nC.").await;
        let store = Arc::new(InMemoryVectorStore::new());
        let p = pipeline(tenants, Arc::new(FakeEmbedder::ok()), store.clone());

        p.ingest(id).await.unwrap();
        let first = store.contents(id).await;
        p.ingest(id).await.unwrap();

        assert_eq!(store.contents(id).await, first);
        assert_eq!(store.count(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_blank_knowledge_is_noop() {
        let (id, tenants) = tenants_with("   \n\n  ").await;
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(FakeEmbedder::ok());
        let p = pipeline(tenants, embedder.clone(), store.clone());

        let report = p.ingest(id).await.unwrap();
        assert_eq!(
            report,
            IngestReport {
                inserted_count: 0,
                generation: None
            }
        );
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.generation(id).await, None);
    }

    #[tokio::test]
    async fn test_unknown_tenant_fails_at_loading() {
        let (_, tenants) = tenants_with("x").await;
        let p = pipeline(
            tenants,
            Arc::new(FakeEmbedder::ok()),
            Arc::new(InMemoryVectorStore::new()),
        );

        let err = p.ingest(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.stage, IngestStage::Loading);
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_untouched() {
        let (id, tenants) = tenants_with("Old fact.").await;
        let store = Arc::new(InMemoryVectorStore::new());
        pipeline(tenants.clone(), Arc::new(FakeEmbedder::ok()), store.clone())
            .ingest(id)
            .await
            .unwrap();
        let before = store.generation(id).await;

        tenants
            .insert(id, Tenant::new(id, "Acme").with_knowledge("New fact."))
            .await;
        let failing = Arc::new(FakeEmbedder {
            fail: true,
            ..FakeEmbedder::ok()
        });
        let err = pipeline(tenants, failing, store.clone())
            .ingest(id)
            .await
            .unwrap_err();

        assert_eq!(err.stage, IngestStage::Embedding);
        assert_eq!(err.status_code(), 503);
        assert_eq!(store.generation(id).await, before);
        assert_eq!(store.contents(id).await, vec!["Old fact."]);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_rejected() {
        let (id, tenants) = tenants_with("A.\n\nB.").await;
        let store = Arc::new(InMemoryVectorStore::new());
        let short = Arc::new(FakeEmbedder {
            drop_last: true,
            ..FakeEmbedder::ok()
        });

        let err = pipeline(tenants, short, store.clone())
            .ingest(id)
            .await
            .unwrap_err();
        assert_eq!(err.stage, IngestStage::Embedding);
        assert_eq!(store.count(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_replace_surfaces_partial_ingestion() {
        let (id, tenants) = tenants_with("A.\n\nB.").await;
        let err = pipeline(tenants, Arc::new(FakeEmbedder::ok()), Arc::new(PartialStore))
            .ingest(id)
            .await
            .unwrap_err();

        assert_eq!(err.stage, IngestStage::Replacing);
        assert!(matches!(err.source, ChatforgeError::PartialIngestion { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(IngestStage::Embedding.to_string(), "embedding");
        assert_eq!(
            serde_json::to_value(IngestStage::Replacing).unwrap(),
            serde_json::json!("replacing")
        );
    }
}
