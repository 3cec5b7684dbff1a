pub mod completion;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod notify;
pub mod prompt;
pub mod store;

pub use completion::{
    CompletionBackend, CompletionError, CompletionGateway, CompletionParams,
    OpenAiCompatibleClient, APOLOGY_REPLY,
};
pub use config::ChatforgeConfig;
pub use embeddings::{create_backend, EmbeddingBackend, EmbeddingError, OpenAiEmbeddingClient};
pub use error::ChatforgeError;
pub use notify::{ResendNotifier, Transcript, TranscriptNotifier};
pub use store::{StoreError, TenantStore, VectorStore};
