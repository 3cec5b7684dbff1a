//! Chat subsystem: one customer message in, one grounded reply out.
//!
//! Two request shapes reach `/chat`:
//! - the tenant variant, resolved against stored tenants (or `preview`), with
//!   retrieval over the tenant's knowledge index
//! - the inline variant from the builder wizard, which carries the whole bot
//!   configuration and skips retrieval

use std::sync::Arc;

use chatforge_core::completion::CompletionGateway;
use chatforge_core::config::RetrievalConfig;
use chatforge_core::embeddings::EmbeddingBackend;
use chatforge_core::error::ChatforgeError;
use chatforge_core::models::{
    ConversationTurn, PersonaConfig, RetrievalResult, Role, Tenant, TenantId,
};
use chatforge_core::notify::Transcript;
use chatforge_core::prompt;
use chatforge_core::store::{TenantStore, VectorStore};
use serde::de::{self, Deserializer};
use serde::Deserialize;

use super::retrieve::retrieve_context;

// ============================================================================
// Request DTOs
// ============================================================================

/// A body carrying `messages` is the inline variant; anything else is the
/// tenant variant. Parse errors of the chosen variant are reported as-is.
#[derive(Debug)]
pub enum ChatRequest {
    Inline(InlineChatRequest),
    Tenant(TenantChatRequest),
}

impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let inline = value
            .as_object()
            .map(|o| o.contains_key("messages"))
            .unwrap_or(false);

        if inline {
            serde_json::from_value(value)
                .map(ChatRequest::Inline)
                .map_err(de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(ChatRequest::Tenant)
                .map_err(de::Error::custom)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantChatRequest {
    pub message: Option<String>,
    #[serde(alias = "chatbotId")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default)]
    pub email_notifications: bool,
    pub notification_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineChatRequest {
    pub messages: Vec<ConversationTurn>,
    pub chatbot_config: InlineChatbotConfig,
    pub user_api_key: Option<String>,
}

/// Bot configuration posted by the builder before the tenant is saved.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InlineChatbotConfig {
    pub name: String,
    pub business_name: String,
    pub industry: String,
    pub location: String,
    pub contact_phone: String,
    pub rag_content: String,
    pub persona: Option<PersonaConfig>,
}

impl InlineChatbotConfig {
    fn into_tenant(self) -> Tenant {
        let mut persona = self.persona.unwrap_or_default();
        if !self.name.trim().is_empty() {
            persona.agent_name = self.name;
        }
        Tenant {
            id: TenantId::PREVIEW.to_string(),
            business_name: self.business_name,
            industry: self.industry,
            location: self.location,
            contact_phone: self.contact_phone,
            knowledge_text: self.rag_content,
            persona,
            notifications: Default::default(),
            completion_api_key: None,
        }
    }
}

// ============================================================================
// ChatService
// ============================================================================

#[derive(Clone)]
pub struct ChatService {
    tenants: Arc<dyn TenantStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    gateway: CompletionGateway,
    retrieval: RetrievalConfig,
}

impl ChatService {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        gateway: CompletionGateway,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            tenants,
            vectors,
            embedder,
            gateway,
            retrieval,
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<String, ChatforgeError> {
        match request {
            ChatRequest::Tenant(req) => self.handle_tenant(req).await,
            ChatRequest::Inline(req) => self.handle_inline(req).await,
        }
    }

    pub async fn handle_tenant(&self, req: TenantChatRequest) -> Result<String, ChatforgeError> {
        let message = req.message.as_deref().map(str::trim).unwrap_or_default();
        let raw_id = req.tenant_id.as_deref().map(str::trim).unwrap_or_default();
        if message.is_empty() || raw_id.is_empty() {
            return Err(ChatforgeError::Validation(
                "Message and tenantId are required".to_string(),
            ));
        }

        let tenant_id = TenantId::parse(raw_id)
            .ok_or_else(|| ChatforgeError::NotFound("Chatbot not found".to_string()))?;

        let tenant = match tenant_id {
            TenantId::Preview => Tenant::preview(),
            TenantId::Stored(id) => self
                .tenants
                .load(id)
                .await?
                .ok_or_else(|| ChatforgeError::NotFound("Chatbot not found".to_string()))?,
        };

        let api_key = self
            .gateway
            .resolve_api_key(&[tenant.completion_api_key.as_deref()])?;

        let retrieval = match tenant_id {
            TenantId::Stored(id) => {
                retrieve_context(
                    id,
                    message,
                    self.embedder.as_deref(),
                    self.vectors.as_ref(),
                    &self.retrieval,
                )
                .await
            }
            TenantId::Preview => RetrievalResult::empty(),
        };

        let history = req.conversation_history;
        let system_prompt = prompt::compose(&tenant, &retrieval, &history);
        let reply = self
            .gateway
            .complete(&system_prompt, &history, message, &api_key)
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            passages = retrieval.len(),
            history = history.len(),
            "Chat turn completed"
        );

        let recipient =
            transcript_recipient(&req.notification_email, req.email_notifications, &tenant);
        if let Some(recipient) = recipient {
            let mut turns = history;
            turns.push(ConversationTurn::user(message));
            turns.push(ConversationTurn::assistant(reply.clone()));
            let transcript = Transcript::new(&recipient, &tenant.business_name, &turns);
            self.gateway.dispatch_transcript(&transcript).await;
        }

        Ok(reply)
    }

    pub async fn handle_inline(&self, req: InlineChatRequest) -> Result<String, ChatforgeError> {
        let mut messages = req.messages;
        let latest = match messages.pop() {
            Some(turn) if turn.role == Role::User && !turn.content.trim().is_empty() => turn,
            _ => {
                return Err(ChatforgeError::Validation(
                    "Messages must end with a user message".to_string(),
                ))
            }
        };

        let api_key = self
            .gateway
            .resolve_api_key(&[req.user_api_key.as_deref()])?;

        let tenant = req.chatbot_config.into_tenant();
        let system_prompt = prompt::compose(&tenant, &RetrievalResult::empty(), &messages);

        self.gateway
            .complete(&system_prompt, &messages, latest.content.trim(), &api_key)
            .await
    }
}

/// Request address wins over the tenant's stored one. Either the request
/// flag or the tenant setting turns sending on.
fn transcript_recipient(
    request_email: &Option<String>,
    request_enabled: bool,
    tenant: &Tenant,
) -> Option<String> {
    if !request_enabled && !tenant.notifications.enabled {
        return None;
    }
    fn address(e: Option<&str>) -> Option<&str> {
        e.map(str::trim).filter(|e| !e.is_empty())
    }
    address(request_email.as_deref())
        .or_else(|| address(tenant.notifications.email.as_deref()))
        .map(str::to_string)
}

// ============================================================================
// TESTS
// ============================================================================
