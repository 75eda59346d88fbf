use crate::config::ChatConfig;

/// When to nudge the assistant to ask for contact details, and how to
/// recognise that it did.
#[derive(Debug, Clone)]
pub struct ContactPolicy {
    enabled: bool,
    instruction: String,
    /// Stored lowercased.
    phrases: Vec<String>,
}

impl ContactPolicy {
    #[must_use]
    pub fn new(enabled: bool, instruction: impl Into<String>, phrases: &[String]) -> Self {
        Self {
            enabled,
            instruction: instruction.into(),
            phrases: phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(
            config.contact_prompt_enabled,
            config.contact_instruction.clone(),
            &config.contact_phrases,
        )
    }

    /// A policy that never prompts and never matches.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, String::new(), &[])
    }

    pub fn enabled(&self) -> bool {
        self.enabled && !self.instruction.trim().is_empty()
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Whether `reply` asks the user for contact details.
    pub fn solicits_contact(&self, reply: &str) -> bool {
        let reply = reply.to_lowercase();
        self.phrases.iter().any(|p| reply.contains(p.as_str()))
    }
}

impl Default for ContactPolicy {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}
