//! Knowledge ingestion: paragraph chunking and the chunk → embed → replace
//! pipeline that rebuilds a tenant's vector index.

pub mod chunker;
pub mod pipeline;

pub use chunker::{chunk, chunk_with_limit, ChunkingConfig};
pub use pipeline::{IngestError, IngestReport, IngestStage, IngestionPipeline};
