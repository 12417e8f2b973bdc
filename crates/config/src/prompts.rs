//! Prompt templates and fixed phrases
//!
//! Everything the agent can say without the model lives here: persona
//! template, fallback greeting, reprompts, goodbyes, canned replies and the
//! keyword tables that pick between them. Templates use `{placeholder}`
//! substitution via [`render_template`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Phrase and prompt tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Persona used when no task, lead or company instructions resolve.
    /// Placeholders: `{agent_name}`, `{company_name}`
    pub default_persona: String,

    /// Instruction for the opening line. Placeholders: `{lead_name}`, `{company_name}`
    pub greeting_instruction: String,

    /// Spoken when greeting generation fails.
    /// Placeholders: `{lead_name}`, `{agent_name}`, `{company_name}`
    pub greeting_fallback: String,

    /// Appended to the prompt when a generated reply fails validation
    pub corrective_reminder: String,

    /// Rotating "didn't catch that" prompts, indexed by retry count
    pub reprompts: Vec<String>,

    /// Spoken when no-input retries are exhausted
    pub closing_line: String,

    /// Goodbyes by interest level. Placeholder: `{lead_name}`
    pub goodbye_high: String,
    pub goodbye_medium: String,
    pub goodbye_default: String,

    /// Spoken when a webhook cannot be handled
    pub apology: String,

    /// Canned replies after generation attempts are exhausted
    pub fallback_price: String,
    pub fallback_demo: String,
    pub fallback_rejection: String,
    pub fallback_other: String,

    /// Keyword tables selecting a canned reply (case-insensitive substring)
    pub price_keywords: Vec<String>,
    pub demo_keywords: Vec<String>,
    pub rejection_keywords: Vec<String>,

    /// Utterances that end the call (case-insensitive substring)
    pub end_phrases: Vec<String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            default_persona: "You are {agent_name}, a friendly and professional sales \
                representative calling on behalf of {company_name}. Keep every reply to one \
                or two short spoken sentences, ask one question at a time, and never \
                describe yourself as automated."
                .to_string(),
            greeting_instruction: "Write a short, warm opening line for a phone call to \
                {lead_name}. Introduce yourself, mention {company_name} by name, and ask if \
                they have a moment to talk."
                .to_string(),
            greeting_fallback: "Hi {lead_name}, this is {agent_name} from {company_name}. \
                Do you have a quick minute to chat about how we can help your business?"
                .to_string(),
            corrective_reminder: "Reminder: reply with one or two natural spoken sentences \
                as a human sales representative. No code, no lists, no labels, and no \
                mention of being an assistant."
                .to_string(),
            reprompts: vec![
                "Sorry, I didn't catch that. Could you say that again?".to_string(),
                "I'm having a little trouble hearing you. Are you still there?".to_string(),
                "Apologies, could you repeat that for me?".to_string(),
            ],
            closing_line: "It sounds like now isn't a good time. I'll try you again later. \
                Have a great day!"
                .to_string(),
            goodbye_high: "Thanks so much, {lead_name}! I'll follow up with the details we \
                discussed. Talk soon!"
                .to_string(),
            goodbye_medium: "Thanks for your time, {lead_name}. I'll send over some \
                information you can look at when it suits you. Have a great day!"
                .to_string(),
            goodbye_default: "I understand, {lead_name}. Thanks for your time, and have a \
                great day."
                .to_string(),
            apology: "I'm sorry, we're having some trouble on our end. We'll call you back \
                shortly. Goodbye."
                .to_string(),
            fallback_price: "Great question about pricing. Our plans are flexible and \
                depend on your team size. Would it help if I walked you through the options?"
                .to_string(),
            fallback_demo: "I'd be happy to show you how it works. Would you be open to a \
                short demo later this week?"
                .to_string(),
            fallback_rejection: "I completely understand. Would it be alright if I sent you \
                some information to look at when you have time?"
                .to_string(),
            fallback_other: "That's a good point. Could you tell me a bit more about what \
                your business needs right now?"
                .to_string(),
            price_keywords: strings(&["price", "cost", "expensive", "how much", "budget", "afford"]),
            demo_keywords: strings(&["demo", "show", "trial", "how does it work"]),
            rejection_keywords: strings(&[
                "not interested",
                "no thanks",
                "busy",
                "not now",
                "don't need",
            ]),
            end_phrases: strings(&[
                "goodbye",
                "bye",
                "not interested",
                "stop calling",
                "do not call",
                "don't call",
                "remove me",
                "take me off",
                "hang up",
            ]),
        }
    }
}

impl PromptsConfig {
    /// Load a standalone phrase file; missing keys keep their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let prompts: Self = serde_yaml::from_str(&content)?;
        prompts.validate()?;
        Ok(prompts)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reprompts.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "prompts.reprompts".to_string(),
                message: "At least one reprompt is required".to_string(),
            });
        }
        if self.end_phrases.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "prompts.end_phrases".to_string(),
                message: "At least one end phrase is required".to_string(),
            });
        }
        Ok(())
    }

    /// Reprompt for the given no-input retry count, rotating
    pub fn reprompt(&self, retry_count: u32) -> &str {
        if self.reprompts.is_empty() {
            return "Sorry, I didn't catch that.";
        }
        &self.reprompts[retry_count as usize % self.reprompts.len()]
    }

    /// Whether the utterance asks to end the call
    pub fn is_end_phrase(&self, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        self.end_phrases
            .iter()
            .any(|phrase| lower.contains(&phrase.to_lowercase()))
    }
}

/// Replace `{key}` placeholders; unknown placeholders are left as-is
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reprompt_rotates() {
        let prompts = PromptsConfig::default();
        assert_eq!(prompts.reprompt(0), prompts.reprompts[0]);
        assert_eq!(prompts.reprompt(1), prompts.reprompts[1]);
        assert_eq!(prompts.reprompt(3), prompts.reprompts[0]);
    }

    #[test]
    fn test_end_phrase_case_insensitive() {
        let prompts = PromptsConfig::default();
        assert!(prompts.is_end_phrase("Not Interested, STOP calling"));
        assert!(prompts.is_end_phrase("ok goodbye then"));
        assert!(!prompts.is_end_phrase("how much does it cost"));
    }

    #[test]
    fn test_render_template() {
        let text = render_template(
            "Hi {lead_name}, this is {agent_name}. {unknown}",
            &[("lead_name", "Sam"), ("agent_name", "Alex")],
        );
        assert_eq!(text, "Hi Sam, this is Alex. {unknown}");
    }

    #[test]
    fn test_from_yaml_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "closing_line: \"Bye for now.\"").unwrap();
        writeln!(file, "reprompts:\n  - \"Hello?\"").unwrap();

        let prompts = PromptsConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(prompts.closing_line, "Bye for now.");
        assert_eq!(prompts.reprompt(5), "Hello?");
        assert!(!prompts.end_phrases.is_empty());
    }

    #[test]
    fn test_empty_reprompts_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reprompts: []").unwrap();
        assert!(PromptsConfig::from_yaml_file(file.path()).is_err());
    }
}
