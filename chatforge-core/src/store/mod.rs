//! Storage abstraction for tenants and their knowledge index.
//!
//! [`VectorStore`] holds one index generation per tenant and answers
//! nearest-neighbour queries against it. [`TenantStore`] is the read-only
//! view of the dashboard's tenant records.
//!
//! Implementations must be `Send + Sync`; handles are shared as
//! `Arc<dyn …>` across request tasks.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EmbeddingRecord, RetrievalResult, Tenant};

pub use memory::{InMemoryTenantStore, InMemoryVectorStore};
pub use postgres::{PgTenantStore, PgVectorStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Old rows were removed but the new set could not be written.
    #[error("Replace for tenant {tenant_id} left the index partially written: {detail}")]
    PartialReplace { tenant_id: Uuid, detail: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Identifier of one complete replace-all cycle.
pub type Generation = Uuid;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Swap the tenant's index for `rows` as a new generation. Readers see
    /// either the old or the new set.
    async fn replace_all(
        &self,
        tenant_id: Uuid,
        rows: &[EmbeddingRecord],
    ) -> Result<Generation, StoreError>;

    /// Up to `top_k` rows of the tenant's live generation with cosine
    /// similarity ≥ `threshold`, best first, ties by sequence index.
    async fn query(
        &self,
        tenant_id: Uuid,
        query_vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<RetrievalResult, StoreError>;

    /// Number of rows in the tenant's live generation.
    async fn count(&self, tenant_id: Uuid) -> Result<usize, StoreError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn load(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError>;
}

/// Every row of one generation must share a dimensionality.
pub fn check_uniform_dimensions(rows: &[EmbeddingRecord]) -> Result<(), StoreError> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let expected = first.vector.len();
    match rows.iter().find(|r| r.vector.len() != expected) {
        Some(bad) => Err(StoreError::DimensionMismatch {
            expected,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
