use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source tag for passages cut from a tenant's raw knowledge text.
pub const KNOWLEDGE_TEXT_SOURCE: &str = "knowledge_text";

/// An immutable passage of tenant knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub tenant_id: Uuid,
    pub seq: i32,
    pub content: String,
    pub source: String,
}

/// A chunk paired with its vector, ready to be written as one row of a
/// tenant's index generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
}

impl EmbeddingRecord {
    pub fn new(chunk: Chunk, vector: Vec<f32>, business_name: &str) -> Self {
        let metadata = serde_json::json!({
            "tenant_id": chunk.tenant_id,
            "index": chunk.seq,
            "source": chunk.source,
            "business": business_name,
        });
        Self {
            chunk,
            vector,
            metadata,
        }
    }
}
