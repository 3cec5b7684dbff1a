pub mod chunk;
pub mod conversation;
pub mod retrieval;
pub mod tenant;

pub use chunk::{Chunk, EmbeddingRecord, KNOWLEDGE_TEXT_SOURCE};
pub use conversation::{ConversationTurn, Role};
pub use retrieval::{RetrievalResult, RetrievedPassage};
pub use tenant::{NotificationSettings, PersonaConfig, Tenant, TenantId};
