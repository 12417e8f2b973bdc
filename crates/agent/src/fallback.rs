//! Canned lines spoken when generation cannot be used

use outreach_config::{render_template, PromptsConfig};
use outreach_core::InterestLevel;

/// Which canned reply matched the utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    Price,
    Demo,
    Rejection,
    Other,
}

impl FallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Demo => "demo",
            Self::Rejection => "rejection",
            Self::Other => "other",
        }
    }
}

/// Pick a canned reply by keyword. Price is checked first, then demo, then rejection.
pub fn select_fallback<'a>(prompts: &'a PromptsConfig, utterance: &str) -> (FallbackKind, &'a str) {
    let lower = utterance.to_lowercase();
    let matches = |keywords: &[String]| keywords.iter().any(|k| lower.contains(&k.to_lowercase()));

    if matches(&prompts.price_keywords) {
        (FallbackKind::Price, &prompts.fallback_price)
    } else if matches(&prompts.demo_keywords) {
        (FallbackKind::Demo, &prompts.fallback_demo)
    } else if matches(&prompts.rejection_keywords) {
        (FallbackKind::Rejection, &prompts.fallback_rejection)
    } else {
        (FallbackKind::Other, &prompts.fallback_other)
    }
}

/// Goodbye personalised by final interest
pub fn goodbye(prompts: &PromptsConfig, interest: InterestLevel, lead_name: &str) -> String {
    let template = match interest {
        InterestLevel::High => &prompts.goodbye_high,
        InterestLevel::Medium => &prompts.goodbye_medium,
        _ => &prompts.goodbye_default,
    };
    render_template(template, &[("lead_name", display_name(lead_name))])
}

pub fn fallback_greeting(
    prompts: &PromptsConfig,
    lead_name: &str,
    agent_name: &str,
    company_name: &str,
) -> String {
    render_template(
        &prompts.greeting_fallback,
        &[
            ("lead_name", display_name(lead_name)),
            ("agent_name", agent_name),
            ("company_name", company_name),
        ],
    )
}

fn display_name(name: &str) -> &str {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "there"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_selection() {
        let prompts = PromptsConfig::default();

        let (kind, text) = select_fallback(&prompts, "How much does it COST?");
        assert_eq!(kind, FallbackKind::Price);
        assert_eq!(text, prompts.fallback_price);

        assert_eq!(select_fallback(&prompts, "can you show me").0, FallbackKind::Demo);
        assert_eq!(
            select_fallback(&prompts, "I'm busy right now").0,
            FallbackKind::Rejection
        );
        assert_eq!(select_fallback(&prompts, "tell me more").0, FallbackKind::Other);
    }

    #[test]
    fn test_price_wins_over_demo() {
        let prompts = PromptsConfig::default();
        assert_eq!(
            select_fallback(&prompts, "what does a demo cost").0,
            FallbackKind::Price
        );
    }

    #[test]
    fn test_goodbye_by_interest() {
        let prompts = PromptsConfig::default();
        assert!(goodbye(&prompts, InterestLevel::High, "Sam").contains("follow up"));
        assert!(goodbye(&prompts, InterestLevel::Medium, "Sam").contains("information"));
        assert!(goodbye(&prompts, InterestLevel::None, "Sam").starts_with("I understand, Sam"));
        assert!(goodbye(&prompts, InterestLevel::Unknown, "").contains("there"));
    }

    #[test]
    fn test_fallback_greeting_names_company() {
        let prompts = PromptsConfig::default();
        let text = fallback_greeting(&prompts, "Sam", "Alex", "Acme");
        assert!(text.starts_with("Hi Sam, this is Alex from Acme."));
    }
}
