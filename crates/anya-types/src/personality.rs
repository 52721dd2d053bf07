//! Personality and generation settings.
//!
//! A [`PersonalityConfig`] enumerates every recognized field with a default,
//! so a partially specified `[personality]` table in the server config still
//! yields a complete personality.

use serde::{Deserialize, Serialize};

/// Sampling parameters forwarded to the inference engine with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus-sampling threshold.
    pub top_p: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Penalty applied to repeated tokens (1.0 disables it).
    pub repeat_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            max_tokens: 200,
            repeat_penalty: 1.1,
        }
    }
}

/// Who the assistant is and how it speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    /// Display name, used in the welcome envelope.
    pub name: String,
    /// Character traits, reported to clients on connect.
    pub traits: Vec<String>,
    /// Free-form description of the speaking style.
    pub speaking_style: String,
    /// Topics the personality gravitates towards.
    pub interests: Vec<String>,
    /// Prepended to every prompt payload when non-empty.
    pub system_prompt: String,
    /// Sampling parameters.
    pub generation: GenerationParams,
}

impl PersonalityConfig {
    /// Returns the system prompt, or `None` if it is blank.
    pub fn system_prompt(&self) -> Option<&str> {
        let prompt = self.system_prompt.trim();
        (!prompt.is_empty()).then_some(prompt)
    }
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            name: "Anya".to_string(),
            traits: ["friendly", "helpful", "curious", "energetic"]
                .into_iter()
                .map(String::from)
                .collect(),
            speaking_style: "casual but informative".to_string(),
            interests: ["technology", "learning", "helping others"]
                .into_iter()
                .map(String::from)
                .collect(),
            system_prompt: "You are Anya, a friendly and energetic AI companion. \
                            You love helping people and learning new things. \
                            Keep responses natural and engaging."
                .to_string(),
            generation: GenerationParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_personality() {
        let p = PersonalityConfig::default();
        assert_eq!(p.name, "Anya");
        assert_eq!(p.traits.len(), 4);
        assert_eq!(p.generation.max_tokens, 200);
        assert!(p.system_prompt().unwrap().starts_with("You are Anya"));
    }

    #[test]
    fn blank_system_prompt_is_none() {
        let p = PersonalityConfig {
            system_prompt: "   ".to_string(),
            ..PersonalityConfig::default()
        };
        assert_eq!(p.system_prompt(), None);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let p: PersonalityConfig = toml::from_str(
            r#"
            name = "Juno"
            [generation]
            temperature = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(p.name, "Juno");
        assert_eq!(p.traits, PersonalityConfig::default().traits);
        assert!((p.generation.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(p.generation.max_tokens, 200);
    }
}
