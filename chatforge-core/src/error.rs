use thiserror::Error;

use crate::completion::CompletionError;
use crate::embeddings::EmbeddingError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ChatforgeError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(#[from] EmbeddingError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] CompletionError),

    #[error("Partial ingestion failure for tenant {tenant_id}: {detail}")]
    PartialIngestion { tenant_id: String, detail: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ChatforgeError {
    /// HTTP status this error maps to at the API boundary.
    ///
    /// Provider failures keep the provider's status when it is an error
    /// status; everything unexpected is a 500.
    pub fn status_code(&self) -> u16 {
        match self {
            ChatforgeError::Validation(_) => 400,
            ChatforgeError::NotFound(_) => 404,
            ChatforgeError::Configuration(_) => 400,
            ChatforgeError::EmbeddingProvider(e) => e.status().map(error_status).unwrap_or(500),
            ChatforgeError::Upstream(e) => e.status().map(error_status).unwrap_or(500),
            ChatforgeError::PartialIngestion { .. }
            | ChatforgeError::Store(_)
            | ChatforgeError::Database(_)
            | ChatforgeError::Config(_) => 500,
        }
    }

    /// Message that is safe to show to widget end users.
    pub fn public_message(&self) -> String {
        match self {
            ChatforgeError::Validation(m)
            | ChatforgeError::NotFound(m)
            | ChatforgeError::Configuration(m) => m.clone(),
            ChatforgeError::EmbeddingProvider(_) | ChatforgeError::Upstream(_) => {
                "The assistant is temporarily unavailable. Please try again later.".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

fn error_status(code: u16) -> u16 {
    if (400..=599).contains(&code) {
        code
    } else {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(ChatforgeError::Validation("x".into()).status_code(), 400);
        assert_eq!(ChatforgeError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ChatforgeError::Configuration("x".into()).status_code(), 400);
        let partial = ChatforgeError::PartialIngestion {
            tenant_id: "t".into(),
            detail: "insert failed".into(),
        };
        assert_eq!(partial.status_code(), 500);
    }

    #[test]
    fn test_upstream_keeps_provider_status() {
        let err = ChatforgeError::from(CompletionError::Api {
            code: 429,
            message: "slow down".into(),
        });
        assert_eq!(err.status_code(), 429);

        let odd = ChatforgeError::from(CompletionError::Api {
            code: 302,
            message: "redirect".into(),
        });
        assert_eq!(odd.status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_provider_detail() {
        let err = ChatforgeError::from(CompletionError::Api {
            code: 401,
            message: "invalid key sk-secret".into(),
        });
        assert!(!err.public_message().contains("sk-secret"));
    }
}
