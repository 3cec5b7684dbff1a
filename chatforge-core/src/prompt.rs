//! Prompt composer: builds the grounded system prompt for one chat turn.
//!
//! Layout, in fixed order:
//! 1. persona instructions and business facts
//! 2. knowledge section: cited passages `[1] …` when retrieval found any,
//!    otherwise the tenant's raw knowledge text verbatim
//! 3. grounding directive with the fixed contact fallback sentence
//!
//! The grounding directive is always last so nothing appended by persona
//! fields can override it.

use crate::models::{ConversationTurn, PersonaConfig, RetrievalResult, Tenant};

/// Knowledge section used when a tenant has no knowledge text at all.
pub const EMPTY_KNOWLEDGE: &str = "No specific knowledge base provided.";

const CHATTINESS_TIERS: [&str; 4] = ["1 sentence", "2-3 sentences", "4-5 sentences", "6+ sentences"];

/// Sentence the model must use when the knowledge section has no answer.
pub fn fallback_sentence(contact_phone: &str) -> String {
    let contact = non_blank(contact_phone).unwrap_or("our support team");
    format!(
        "I don't have specific information about that. Please contact us directly at {} for assistance.",
        contact
    )
}

/// Response-length instruction for a chattiness level, clamped to 0..=3.
pub fn chattiness_tier(level: i64) -> &'static str {
    CHATTINESS_TIERS[level.clamp(0, 3) as usize]
}

pub fn compose(
    tenant: &Tenant,
    retrieval: &RetrievalResult,
    history: &[ConversationTurn],
) -> String {
    let mut prompt = String::new();

    push_persona(&mut prompt, tenant, &tenant.persona, !history.is_empty());
    push_business(&mut prompt, tenant);
    push_knowledge(&mut prompt, tenant, retrieval);
    push_grounding(&mut prompt, tenant);

    prompt
}

fn push_persona(prompt: &mut String, tenant: &Tenant, persona: &PersonaConfig, ongoing: bool) {
    let business = non_blank(&tenant.business_name).unwrap_or("the business");
    let name = non_blank(&persona.agent_name).unwrap_or("a helpful assistant");
    let role = non_blank(&persona.agent_role).unwrap_or("customer service representative");

    prompt.push_str(&format!(
        "You are {}, an AI {} for {}.\n\n",
        name, role, business
    ));

    prompt.push_str("PERSONA:\n");
    prompt.push_str(&format!("- Tone: {}\n", describe_tone(&persona.tone)));
    prompt.push_str(&format!(
        "- Response length: keep each answer to about {}.\n",
        chattiness_tier(persona.chattiness)
    ));
    prompt.push_str(&format!(
        "- Response style: {}\n",
        describe_style(&persona.response_style)
    ));
    prompt.push_str(&format!(
        "- Language: always respond in {}.\n",
        language_name(&persona.language)
    ));
    prompt.push_str(&format!(
        "- Always stay in character as a representative of {}.\n",
        business
    ));
    if ongoing {
        prompt.push_str("- This is an ongoing conversation; do not greet the customer again.\n");
    }
    if let Some(extra) = non_blank(&persona.special_instructions) {
        prompt.push_str(&format!("- Special instructions: {}\n", extra));
    }
    prompt.push('\n');
}

fn push_business(prompt: &mut String, tenant: &Tenant) {
    prompt.push_str("BUSINESS INFORMATION:\n");
    prompt.push_str(&format!(
        "- Business: {}\n",
        non_blank(&tenant.business_name).unwrap_or("N/A")
    ));
    prompt.push_str(&format!(
        "- Industry: {}\n",
        non_blank(&tenant.industry).unwrap_or("N/A")
    ));
    prompt.push_str(&format!(
        "- Location: {}\n",
        non_blank(&tenant.location).unwrap_or("N/A")
    ));
    prompt.push_str(&format!(
        "- Contact: {}\n\n",
        non_blank(&tenant.contact_phone).unwrap_or("N/A")
    ));
}

fn push_knowledge(prompt: &mut String, tenant: &Tenant, retrieval: &RetrievalResult) {
    prompt.push_str("KNOWLEDGE BASE:\n");

    if retrieval.is_empty() {
        let raw = if tenant.has_knowledge() {
            tenant.knowledge_text.as_str()
        } else {
            EMPTY_KNOWLEDGE
        };
        prompt.push_str(raw);
        prompt.push_str("\n\n");
        return;
    }

    for (i, passage) in retrieval.passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, passage.content));
    }
    prompt.push_str(
        "\nWhen you use a passage, cite it with its bracketed number, for example [1].\n\n",
    );
}

fn push_grounding(prompt: &mut String, tenant: &Tenant) {
    prompt.push_str("CRITICAL INSTRUCTIONS:\n");
    prompt.push_str(
        "1. You MUST ONLY answer questions using the information in the KNOWLEDGE BASE above.\n",
    );
    prompt.push_str(&format!(
        "2. If the question cannot be answered from the KNOWLEDGE BASE, respond with exactly: \"{}\"\n",
        fallback_sentence(&tenant.contact_phone)
    ));
    prompt.push_str(
        "3. Do NOT make up information or answer from general knowledge.\n\
         Remember: ONLY use information from the knowledge base above.",
    );
}

fn describe_tone(tone: &str) -> String {
    match tone.trim().to_ascii_lowercase().as_str() {
        "friendly" => "friendly (warm and approachable)".to_string(),
        "professional" => "professional (formal and businesslike)".to_string(),
        "casual" => "casual (relaxed and informal)".to_string(),
        "empathetic" => "empathetic (understanding and caring)".to_string(),
        "authoritative" => "authoritative (confident and knowledgeable)".to_string(),
        "playful" => "playful (fun and energetic)".to_string(),
        "" => "friendly (warm and approachable)".to_string(),
        other => other.to_string(),
    }
}

fn describe_style(style: &str) -> String {
    match style.trim().to_ascii_lowercase().as_str() {
        "concise" => "concise, short and to the point".to_string(),
        "detailed" => "detailed, with comprehensive explanations".to_string(),
        "conversational" | "" => "conversational, with a natural dialogue flow".to_string(),
        "structured" => "structured, organized with bullet points".to_string(),
        other => other.to_string(),
    }
}

fn language_name(code: &str) -> String {
    match code.trim().to_ascii_lowercase().as_str() {
        "en" | "" => "English".to_string(),
        "es" => "Spanish".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "it" => "Italian".to_string(),
        "pt" => "Portuguese".to_string(),
        "zh" => "Chinese".to_string(),
        "ja" => "Japanese".to_string(),
        _ => code.trim().to_string(),
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedPassage;
    use uuid::Uuid;

    fn tenant() -> Tenant {
        Tenant::new(Uuid::new_v4(), "Acme Bakery")
            .with_contact_phone("555-0100")
            .with_knowledge("Store hours: 9-5")
    }

    fn passages(items: &[&str]) -> RetrievalResult {
        items
            .iter()
            .enumerate()
            .map(|(i, c)| RetrievedPassage {
                content: c.to_string(),
                seq: i as i32,
                similarity: 0.9 - i as f32 * 0.1,
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_empty_retrieval_uses_raw_knowledge_and_fallback() {
        let prompt = compose(&tenant(), &RetrievalResult::empty(), &[]);
        assert!(prompt.contains("9-5"));
        assert!(prompt.contains(&fallback_sentence("555-0100")));
        assert!(prompt.contains("555-0100"));
    }

    #[test]
    fn test_retrieved_passages_are_numbered_and_replace_raw_text() {
        let t = tenant().with_knowledge("RAW TEXT SHOULD NOT APPEAR");
        let prompt = compose(&t, &passages(&["We ship in 3 days.", "Returns within 30 days."]), &[]);
        assert!(prompt.contains("[1] We ship in 3 days."));
        assert!(prompt.contains("[2] Returns within 30 days."));
        assert!(!prompt.contains("RAW TEXT SHOULD NOT APPEAR"));
    }

    #[test]
    fn test_section_order_persona_knowledge_grounding() {
        let mut t = tenant();
        t.persona.special_instructions = "Mention the loyalty card.".to_string();
        let prompt = compose(&t, &RetrievalResult::empty(), &[]);

        let persona = prompt.find("Mention the loyalty card.").unwrap();
        let knowledge = prompt.find("KNOWLEDGE BASE:").unwrap();
        let grounding = prompt.find("CRITICAL INSTRUCTIONS:").unwrap();
        assert!(persona < knowledge);
        assert!(knowledge < grounding);
        assert!(prompt.trim_end().ends_with("ONLY use information from the knowledge base above."));
    }

    #[test]
    fn test_chattiness_is_clamped() {
        let mut high = tenant();
        high.persona.chattiness = 99;
        let mut three = tenant();
        three.persona.chattiness = 3;
        three.id = high.id.clone();

        assert_eq!(
            compose(&high, &RetrievalResult::empty(), &[]),
            compose(&three, &RetrievalResult::empty(), &[])
        );
        assert_eq!(chattiness_tier(-4), "1 sentence");
        assert_eq!(chattiness_tier(2), "4-5 sentences");
        assert!(compose(&high, &RetrievalResult::empty(), &[]).contains("6+ sentences"));
    }

    #[test]
    fn test_blank_knowledge_uses_placeholder() {
        let t = tenant().with_knowledge("   ");
        let prompt = compose(&t, &RetrievalResult::empty(), &[]);
        assert!(prompt.contains(EMPTY_KNOWLEDGE));
    }

    #[test]
    fn test_blank_phone_falls_back_to_support_team() {
        assert!(fallback_sentence("").contains("our support team"));
    }

    #[test]
    fn test_language_and_tone_mapping() {
        let mut t = tenant();
        t.persona.language = "es".to_string();
        t.persona.tone = "professional".to_string();
        let prompt = compose(&t, &RetrievalResult::empty(), &[]);
        assert!(prompt.contains("respond in Spanish"));
        assert!(prompt.contains("formal and businesslike"));

        t.persona.language = "Klingon".to_string();
        assert!(compose(&t, &RetrievalResult::empty(), &[]).contains("respond in Klingon"));
    }

    #[test]
    fn test_history_adds_no_regreet_instruction() {
        let fresh = compose(&tenant(), &RetrievalResult::empty(), &[]);
        let ongoing = compose(
            &tenant(),
            &RetrievalResult::empty(),
            &[ConversationTurn::user("hi")],
        );
        assert!(!fresh.contains("do not greet"));
        assert!(ongoing.contains("do not greet"));
    }
}
