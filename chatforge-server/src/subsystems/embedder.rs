//! Backend wiring: builds the provider clients from the application config.
//!
//! The embedding backend is optional: without a key the service still chats,
//! using each tenant's raw knowledge text instead of retrieved passages, but
//! refuses to ingest.

use std::sync::Arc;

use chatforge_core::completion::{
    CompletionError, CompletionGateway, CompletionParams, OpenAiCompatibleClient,
};
use chatforge_core::embeddings::{EmbeddingBackend, EmbeddingError};
use chatforge_core::notify::{NotifyError, ResendNotifier};
use chatforge_core::ChatforgeConfig;

/// Create the embedding backend, or `None` when no API key is configured.
pub fn create_backend_from_config(
    config: &ChatforgeConfig,
) -> Result<Option<Arc<dyn EmbeddingBackend>>, EmbeddingError> {
    let backend = chatforge_core::embeddings::create_backend(&config.embedding)?;
    match &backend {
        Some(b) => tracing::info!(
            backend = b.name(),
            model = %config.embedding.model,
            dimensions = b.dimensions(),
            "Embedding backend ready"
        ),
        None => tracing::warn!("No embedding API key configured; retrieval and ingestion disabled"),
    }
    Ok(backend.map(Arc::from))
}

/// Create the completion gateway, attaching the transcript notifier when an
/// email API key is configured.
pub fn create_gateway_from_config(
    config: &ChatforgeConfig,
) -> Result<CompletionGateway, CompletionError> {
    let client = OpenAiCompatibleClient::new(&config.completion)?;
    let gateway = CompletionGateway::new(
        Arc::new(client),
        CompletionParams::from(&config.completion),
        config.completion.api_key.clone(),
    );

    match ResendNotifier::new(&config.notification) {
        Ok(notifier) => {
            tracing::info!("Transcript notifications enabled");
            Ok(gateway.with_notifier(Arc::new(notifier)))
        }
        Err(NotifyError::MissingApiKey) => {
            tracing::info!("No email API key configured; transcript notifications disabled");
            Ok(gateway)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build transcript notifier; notifications disabled");
            Ok(gateway)
        }
    }
}
