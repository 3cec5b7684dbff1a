//! Transcript notifications sent to the tenant after a chat turn.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::config::NotificationConfig;
use crate::models::{ConversationTurn, Role};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,
}

/// A rendered conversation addressed to one recipient.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub recipient: String,
    pub subject: String,
    pub html: String,
}

impl Transcript {
    pub fn new(recipient: &str, business_name: &str, turns: &[ConversationTurn]) -> Self {
        let business = if business_name.trim().is_empty() {
            "Chatbot"
        } else {
            business_name
        };

        let conversation = render_conversation(turns);

        let html = format!(
            "<h2>New Chatbot Conversation</h2>\n\
             <p><strong>Business:</strong> {}</p>\n\
             <p><strong>Time:</strong> {}</p>\n\
             <h3>Conversation:</h3>\n\
             <div style=\"background-color: #f5f5f5; padding: 20px; border-radius: 8px; white-space: pre-wrap; font-family: monospace;\">\n{}\n</div>",
            escape_html(business),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            escape_html(&conversation),
        );

        Self {
            recipient: recipient.to_string(),
            subject: format!("New Conversation - {}", business),
            html,
        }
    }
}

/// `Customer: …` / `AI: …` blocks separated by blank lines.
pub fn render_conversation(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| {
            let speaker = match t.role {
                Role::User => "Customer",
                _ => "AI",
            };
            format!("{}: {}", speaker, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
pub trait TranscriptNotifier: Send + Sync {
    async fn send(&self, transcript: &Transcript) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Sends transcripts through the Resend email HTTP API.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    client: Client,
    api_key: String,
    from: String,
    base_url: String,
}

impl ResendNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        Self::with_base_url(config, config.base_url.clone())
    }

    pub fn with_base_url(config: &NotificationConfig, base_url: String) -> Result<Self, NotifyError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(NotifyError::MissingApiKey)?;

        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            api_key,
            from: config.from.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TranscriptNotifier for ResendNotifier {
    async fn send(&self, transcript: &Transcript) -> Result<(), NotifyError> {
        let request = EmailRequest {
            from: &self.from,
            to: [&transcript.recipient],
            subject: &transcript.subject,
            html: &transcript.html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                code: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(key: Option<&str>) -> NotificationConfig {
        NotificationConfig {
            api_key: key.map(str::to_string),
            ..NotificationConfig::default()
        }
    }

    #[test]
    fn test_render_conversation_labels_speakers() {
        let turns = vec![
            ConversationTurn::system("hidden"),
            ConversationTurn::user("Do you deliver?"),
            ConversationTurn::assistant("Yes, within 3 days."),
        ];
        assert_eq!(
            render_conversation(&turns),
            "Customer: Do you deliver?\n\nAI: Yes, within 3 days."
        );
    }

    #[test]
    fn test_transcript_escapes_html() {
        let t = Transcript::new(
            "a@b.c",
            "Tom & Jerry's",
            &[ConversationTurn::user("<script>alert(1)</script>")],
        );
        assert_eq!(t.subject, "New Conversation - Tom & Jerry's");
        assert!(t.html.contains("Tom &amp; Jerry&#39;s"));
        assert!(t.html.contains("&lt;script&gt;"));
        assert!(!t.html.contains("<script>"));
    }

    #[test]
    fn test_transcript_blank_business_name() {
        let t = Transcript::new("a@b.c", "  ", &[]);
        assert_eq!(t.subject, "New Conversation - Chatbot");
    }

    #[test]
    fn test_notifier_requires_key() {
        assert!(matches!(
            ResendNotifier::new(&config(None)),
            Err(NotifyError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_send_posts_email() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(serde_json::json!({
                "to": ["owner@example.com"],
                "subject": "New Conversation - Acme"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "1" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier =
            ResendNotifier::with_base_url(&config(Some("re_test")), mock_server.uri()).unwrap();
        let t = Transcript::new("owner@example.com", "Acme", &[ConversationTurn::user("hi")]);
        notifier.send(&t).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad address"))
            .mount(&mock_server)
            .await;

        let notifier =
            ResendNotifier::with_base_url(&config(Some("re_test")), mock_server.uri()).unwrap();
        let t = Transcript::new("nope", "Acme", &[]);
        match notifier.send(&t).await {
            Err(NotifyError::Api { code, .. }) => assert_eq!(code, 422),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }
}
