//! In-memory stores for tests and database-less runs.
//!
//! Vector search is brute-force cosine similarity over the tenant's live
//! generation. `replace_all` swaps the whole generation under the write lock,
//! so concurrent readers observe the old set or the new one.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{check_uniform_dimensions, cosine_similarity, Generation, StoreError, TenantStore, VectorStore};
use crate::models::{EmbeddingRecord, RetrievalResult, RetrievedPassage, Tenant};

struct StoredRow {
    seq: i32,
    content: String,
    vector: Vec<f32>,
}

struct TenantIndex {
    generation: Generation,
    rows: Vec<StoredRow>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    indexes: RwLock<HashMap<Uuid, TenantIndex>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live generation id for a tenant, if it was ever ingested.
    pub async fn generation(&self, tenant_id: Uuid) -> Option<Generation> {
        self.indexes
            .read()
            .await
            .get(&tenant_id)
            .map(|idx| idx.generation)
    }

    /// Contents of the live generation in sequence order.
    pub async fn contents(&self, tenant_id: Uuid) -> Vec<String> {
        self.indexes
            .read()
            .await
            .get(&tenant_id)
            .map(|idx| idx.rows.iter().map(|r| r.content.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn replace_all(
        &self,
        tenant_id: Uuid,
        rows: &[EmbeddingRecord],
    ) -> Result<Generation, StoreError> {
        check_uniform_dimensions(rows)?;
        let generation = Uuid::new_v4();
        let mut stored: Vec<StoredRow> = rows
            .iter()
            .map(|r| StoredRow {
                seq: r.chunk.seq,
                content: r.chunk.content.clone(),
                vector: r.vector.clone(),
            })
            .collect();
        stored.sort_by_key(|r| r.seq);

        let mut indexes = self.indexes.write().await;
        indexes.insert(
            tenant_id,
            TenantIndex {
                generation,
                rows: stored,
            },
        );

        tracing::debug!(tenant_id = %tenant_id, generation = %generation, rows = rows.len(), "Replaced in-memory index");
        Ok(generation)
    }

    async fn query(
        &self,
        tenant_id: Uuid,
        query_vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<RetrievalResult, StoreError> {
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(&tenant_id) else {
            return Ok(RetrievalResult::empty());
        };

        if let Some(first) = index.rows.first() {
            if first.vector.len() != query_vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: first.vector.len(),
                    actual: query_vector.len(),
                });
            }
        }

        let mut scored: Vec<RetrievedPassage> = index
            .rows
            .iter()
            .map(|r| RetrievedPassage {
                content: r.content.clone(),
                seq: r.seq,
                similarity: cosine_similarity(&r.vector, query_vector),
            })
            .filter(|p| p.similarity >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        scored.truncate(top_k);

        Ok(scored.into())
    }

    async fn count(&self, tenant_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .indexes
            .read()
            .await
            .get(&tenant_id)
            .map(|idx| idx.rows.len())
            .unwrap_or(0))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: Uuid, tenant: Tenant) {
        self.tenants.write().await.insert(id, tenant);
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn load(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.read().await.get(&tenant_id).cloned())
    }
}
