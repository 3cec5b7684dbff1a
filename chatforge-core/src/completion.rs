//! Completion gateway: forwards a composed conversation to an
//! OpenAI-compatible chat-completions API (OpenRouter by default).
//!
//! The gateway always hands the caller a displayable string: a reply without
//! content becomes a fixed apology. Transcript notification runs after a
//! successful completion and never affects the chat result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::error::ChatforgeError;
use crate::models::{ConversationTurn, Role};
use crate::notify::{Transcript, TranscriptNotifier};

/// Returned when the provider answers without any message content.
pub const APOLOGY_REPLY: &str = "I'm sorry, I couldn't process your request at the moment.";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },
}

impl CompletionError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Api { code, .. } => Some(*code),
            CompletionError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Generation parameters sent with every request.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&CompletionConfig> for CompletionParams {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send `messages` and return the first choice's content, if any.
    async fn chat(
        &self,
        messages: &[ConversationTurn],
        params: &CompletionParams,
        api_key: &str,
    ) -> Result<Option<String>, CompletionError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Provider API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

// ============================================================================
// OpenAiCompatibleClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    referer: String,
    title: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: &CompletionConfig,
        base_url: String,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleClient {
    async fn chat(
        &self,
        messages: &[ConversationTurn],
        params: &CompletionParams,
        api_key: &str,
    ) -> Result<Option<String>, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &params.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Completion API error");
            return Err(CompletionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty()))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================================================
// CompletionGateway
// ============================================================================

/// Injectable front door to the completion provider and the transcript
/// notifier.
#[derive(Clone)]
pub struct CompletionGateway {
    backend: Arc<dyn CompletionBackend>,
    notifier: Option<Arc<dyn TranscriptNotifier>>,
    params: CompletionParams,
    default_api_key: Option<String>,
}

impl CompletionGateway {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        params: CompletionParams,
        default_api_key: Option<String>,
    ) -> Self {
        Self {
            backend,
            notifier: None,
            params,
            default_api_key: default_api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn TranscriptNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Pick the first non-blank key in precedence order, ending with the
    /// shared default.
    pub fn resolve_api_key(&self, overrides: &[Option<&str>]) -> Result<String, ChatforgeError> {
        overrides
            .iter()
            .flatten()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_api_key.clone())
            .ok_or_else(|| {
                ChatforgeError::Configuration("Completion API key not configured".to_string())
            })
    }

    /// Send `[system, ...history, user]` and return the reply text.
    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        latest_user_turn: &str,
        api_key: &str,
    ) -> Result<String, ChatforgeError> {
        if api_key.trim().is_empty() {
            return Err(ChatforgeError::Configuration(
                "Completion API key not configured".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ConversationTurn::system(system_prompt));
        messages.extend(history.iter().filter(|t| t.role != Role::System).cloned());
        messages.push(ConversationTurn::user(latest_user_turn));

        let reply = self.backend.chat(&messages, &self.params, api_key).await?;

        Ok(reply.unwrap_or_else(|| {
            tracing::warn!(backend = self.backend.name(), "Completion returned no content");
            APOLOGY_REPLY.to_string()
        }))
    }

    /// Best-effort transcript email. Failures are logged and swallowed.
    pub async fn dispatch_transcript(&self, transcript: &Transcript) {
        let Some(notifier) = &self.notifier else {
            tracing::debug!("Transcript requested but no notifier configured");
            return;
        };

        match notifier.send(transcript).await {
            Ok(()) => tracing::info!(to = %transcript.recipient, "Transcript email sent"),
            Err(e) => {
                tracing::error!(to = %transcript.recipient, error = %e, "Failed to send transcript email")
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> CompletionConfig {
        CompletionConfig {
            timeout_seconds: 5,
            ..CompletionConfig::default()
        }
    }

    fn gateway_for(mock_server: &MockServer, default_key: Option<&str>) -> CompletionGateway {
        let config = test_config();
        let client = OpenAiCompatibleClient::with_base_url(&config, mock_server.uri()).unwrap();
        CompletionGateway::new(
            Arc::new(client),
            CompletionParams::from(&config),
            default_key.map(str::to_string),
        )
    }

    fn reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_complete_sends_system_history_and_user_turn() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer tenant-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "microsoft/wizardlm-2-8x22b",
                "max_tokens": 300,
                "messages": [
                    { "role": "system", "content": "SYSTEM" },
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "content": "hello" },
                    { "role": "user", "content": "How fast is shipping?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("3 days")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = gateway_for(&mock_server, None);
        let history = vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello"),
        ];
        let out = gateway
            .complete("SYSTEM", &history, "How fast is shipping?", "tenant-key")
            .await
            .unwrap();
        assert_eq!(out, "3 days");
    }

    #[tokio::test]
    async fn test_complete_missing_content_returns_apology() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        let gateway = gateway_for(&mock_server, None);
        let out = gateway.complete("S", &[], "q", "k").await.unwrap();
        assert_eq!(out, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn test_complete_non_success_is_upstream_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let gateway = gateway_for(&mock_server, None);
        let err = gateway.complete("S", &[], "q", "k").await.unwrap_err();
        assert!(matches!(err, ChatforgeError::Upstream(_)));
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_complete_blank_key_is_configuration_error() {
        let mock_server = MockServer::start().await;
        let gateway = gateway_for(&mock_server, None);
        let err = gateway.complete("S", &[], "q", " ").await.unwrap_err();
        assert!(matches!(err, ChatforgeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_resolve_api_key_precedence() {
        let mock_server = MockServer::start().await;
        let gateway = gateway_for(&mock_server, Some("shared"));

        assert_eq!(
            gateway.resolve_api_key(&[Some("tenant"), Some("user")]).unwrap(),
            "tenant"
        );
        assert_eq!(
            gateway.resolve_api_key(&[Some(""), Some("user")]).unwrap(),
            "user"
        );
        assert_eq!(gateway.resolve_api_key(&[None]).unwrap(), "shared");

        let bare = gateway_for(&mock_server, None);
        assert!(matches!(
            bare.resolve_api_key(&[None, Some("  ")]),
            Err(ChatforgeError::Configuration(_))
        ));
    }

    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TranscriptNotifier for RecordingNotifier {
        async fn send(&self, transcript: &Transcript) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Api {
                    code: 500,
                    message: "mail down".into(),
                });
            }
            self.sent.lock().unwrap().push(transcript.recipient.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_transcript_swallows_failures() {
        let mock_server = MockServer::start().await;
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let gateway = gateway_for(&mock_server, None).with_notifier(notifier.clone());

        let transcript = Transcript::new(
            "owner@example.com",
            "Acme",
            &[ConversationTurn::user("hi"), ConversationTurn::assistant("hello")],
        );
        gateway.dispatch_transcript(&transcript).await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_transcript_sends_when_configured() {
        let mock_server = MockServer::start().await;
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail: false,
        });
        let gateway = gateway_for(&mock_server, None).with_notifier(notifier.clone());

        let transcript = Transcript::new("owner@example.com", "Acme", &[]);
        gateway.dispatch_transcript(&transcript).await;
        assert_eq!(
            notifier.sent.lock().unwrap().as_slice(),
            ["owner@example.com".to_string()]
        );
    }
}
