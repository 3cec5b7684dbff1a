use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier accepted at the API boundary: a stored tenant, or the
/// built-in preview bot used by the builder wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantId {
    Stored(Uuid),
    Preview,
}

impl TenantId {
    pub const PREVIEW: &'static str = "preview";

    /// Parse a raw id. Returns `None` for anything that is neither a UUID
    /// nor the preview marker.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == Self::PREVIEW {
            return Some(TenantId::Preview);
        }
        Uuid::parse_str(raw).ok().map(TenantId::Stored)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantId::Stored(id) => write!(f, "{}", id),
            TenantId::Preview => f.write_str(Self::PREVIEW),
        }
    }
}

/// How the agent talks. Every field has a default so partially filled
/// dashboard records deserialize into a usable persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonaConfig {
    pub agent_name: String,
    pub agent_role: String,
    pub tone: String,
    /// 0 = minimal … 3 = chatty. Clamped when the prompt is composed.
    pub chattiness: i64,
    pub response_style: String,
    pub special_instructions: String,
    pub language: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            agent_name: "AI Assistant".to_string(),
            agent_role: "Customer Support Agent".to_string(),
            tone: "friendly".to_string(),
            chattiness: 1,
            response_style: "conversational".to_string(),
            special_instructions: String::new(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    pub email: Option<String>,
}

/// One configured chatbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// `"preview"` or a UUID string.
    pub id: String,
    pub business_name: String,
    pub industry: String,
    pub location: String,
    pub contact_phone: String,
    pub knowledge_text: String,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Tenant-specific completion key; overrides the shared default.
    #[serde(default, skip_serializing)]
    pub completion_api_key: Option<String>,
}

impl Tenant {
    pub fn new(id: Uuid, business_name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            business_name: business_name.into(),
            industry: String::new(),
            location: String::new(),
            contact_phone: String::new(),
            knowledge_text: String::new(),
            persona: PersonaConfig::default(),
            notifications: NotificationSettings::default(),
            completion_api_key: None,
        }
    }

    /// Demo bot served for the `preview` id without touching storage.
    pub fn preview() -> Self {
        Self {
            id: TenantId::PREVIEW.to_string(),
            business_name: "Preview Chatbot".to_string(),
            industry: "Demo".to_string(),
            location: "Preview Mode".to_string(),
            contact_phone: "N/A".to_string(),
            knowledge_text: "This is a preview of the chatbot. You can ask me anything!"
                .to_string(),
            persona: PersonaConfig::default(),
            notifications: NotificationSettings::default(),
            completion_api_key: None,
        }
    }

    pub fn with_knowledge(mut self, text: impl Into<String>) -> Self {
        self.knowledge_text = text.into();
        self
    }

    pub fn with_contact_phone(mut self, phone: impl Into<String>) -> Self {
        self.contact_phone = phone.into();
        self
    }

    pub fn has_knowledge(&self) -> bool {
        !self.knowledge_text.trim().is_empty()
    }
}
