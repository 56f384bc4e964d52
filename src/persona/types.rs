//! Persona data types: the prose bundles and model config a persona carries.

use serde::{Deserialize, Serialize};

/// Beliefs and pet peeves that shape how a persona argues in a discussion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Soul {
    pub beliefs: Vec<String>,
    pub pet_peeves: Vec<String>,
}

/// Voice, emoji rules, and worked examples that shape how a persona writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Style {
    pub voice: String,
    pub emoji_rules: String,
    pub examples: Vec<String>,
}

/// Per-mode instructions (e.g. review, qa, ambient-chat).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skill {
    pub instructions: std::collections::HashMap<String, String>,
}

/// Optional per-persona LLM provider override.
///
/// `env_overrides` values may be encrypted with [`crate::secrets::EnvKey`];
/// callers should pass them through `EnvKey::decrypt` before use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaModelConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub env_overrides: std::collections::HashMap<String, String>,
}

/// A persona the bot can impersonate in chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub soul: Soul,
    pub style: Style,
    pub skill: Skill,
    /// Domain keywords this persona owns, used for handoff scoring.
    pub expertise: Vec<String>,
    pub interests: Vec<String>,
    pub model_config: Option<PersonaModelConfig>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Persona {
    /// Count how many of this persona's `expertise`/`interests` keywords and
    /// role words appear in `text`, used to score ad-hoc handoff candidates.
    pub fn handoff_score(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        let keyword_hit = |kw: &String| lower.contains(kw.to_lowercase().as_str());
        let expertise_hits = self.expertise.iter().filter(|kw| keyword_hit(kw)).count();
        let interest_hits = self.interests.iter().filter(|kw| keyword_hit(kw)).count();
        let role_hits = self.role.split_whitespace().filter(|word| lower.contains(&word.to_lowercase())).count();
        expertise_hits + interest_hits + role_hits
    }
}

/// Partial update for [`crate::persona::store::PersonaStore::update`]. Any
/// `env_overrides` entry whose value is the sentinel `"***"` keeps the
/// existing decrypted value instead of overwriting it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonaPatch {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub soul: Option<Soul>,
    pub style: Option<Style>,
    pub skill: Option<Skill>,
    pub expertise: Option<Vec<String>>,
    pub interests: Option<Vec<String>>,
    pub model_config: Option<Option<PersonaModelConfig>>,
    pub is_active: Option<bool>,
}

pub const ENV_OVERRIDE_SENTINEL: &str = "***";

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(role: &str, expertise: &[&str], interests: &[&str]) -> Persona {
        Persona {
            id: "p1".to_string(),
            display_name: "Maya".to_string(),
            role: role.to_string(),
            avatar_url: None,
            soul: Soul::default(),
            style: Style::default(),
            skill: Skill::default(),
            expertise: expertise.iter().map(|s| s.to_string()).collect(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            model_config: None,
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn handoff_score_counts_expertise_and_interest_hits() {
        let p = persona("security engineer", &["security", "auth", "secrets"], &["threat modeling"]);
        let score = p.handoff_score("can someone check the auth flow for secrets leakage?");
        assert!(score >= 2, "expected at least two keyword hits, got {score}");
    }

    #[test]
    fn handoff_score_is_zero_for_unrelated_text() {
        let p = persona("security engineer", &["security", "auth", "secrets"], &["threat modeling"]);
        assert_eq!(p.handoff_score("what's for lunch today?"), 0);
    }

    #[test]
    fn handoff_score_is_case_insensitive() {
        let p = persona("QA engineer", &["testing"], &[]);
        assert!(p.handoff_score("TESTING this PR now") > 0);
    }
}
