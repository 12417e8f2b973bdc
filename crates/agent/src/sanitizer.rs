//! Response sanitizer for spoken replies
//!
//! Everything the model produces passes through [`ResponseSanitizer::clean`]
//! before it reaches a caller's ear. Cleaning strips labels and markup,
//! rewrites assistant self-references into sales-rep phrasing, enforces the
//! length window and rejects text that is clearly not speech (code, stack
//! traces, serialization artifacts).

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use outreach_config::constants::reply::{MAX_CHARS, MIN_CHARS};

/// Why a reply was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("Reply is empty after cleaning")]
    Empty,

    #[error("Reply too short ({0} chars)")]
    TooShort(usize),

    #[error("Reply contains forbidden content: {0}")]
    Forbidden(String),
}

static ROLE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*[*_]*(?:agent|assistant|ai|bot|system|user|lead|customer|sales ?rep(?:resentative)?|response|reply)[*_]*\s*:[*_]*\s*",
    )
    .expect("valid role label regex")
});

static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").expect("valid heading regex"));

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+").expect("valid bullet regex"));

static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*{1,3}|_{2,3}|~~").expect("valid emphasis regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Ordered rewrites; more specific patterns first
static AI_REWRITES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)\bI(?:'m| am) (?:just |only )?an? (?:AI|artificial intelligence|virtual assistant|language model|chatbot|bot|automated assistant)(?: (?:language model|assistant|model|system))?\b",
            "I'm a member of the sales team",
        ),
        (
            r"(?i)\bas an? (?:AI|artificial intelligence|virtual assistant|language model|automated assistant)(?: (?:language model|assistant|model|system))?\b",
            "as part of our team",
        ),
        (
            r"(?i)\b(?:an? )?(?:AI|virtual|automated) assistant\b",
            "a sales representative",
        ),
        (r"(?i)\b(?:a )?(?:large )?language model\b", "a sales representative"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid rewrite regex"), replacement))
    .collect()
});

/// First-person identity claims that must not survive rewriting.
///
/// Product talk ("an AI-powered CRM", "we integrate with OpenAI") is allowed.
static AI_IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:i(?:['’]m| am)(?: just| only| actually| really)? (?:an? )?(?:ai|artificial intelligence|chatbot|bot|language model|virtual assistant|automated assistant|computer program)|as an? (?:ai|artificial intelligence|chatbot|language model)|i(?:['’]m| am) not (?:a )?(?:real person|human)|i was (?:made|created|trained|built) by openai)\b",
    )
    .expect("valid identity regex")
});

static NULL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:null|undefined)\b").expect("valid null regex"));

static NAN_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bNaN\b").expect("valid NaN regex"));

/// Substrings that mark code, traces or markup
const REJECT_TOKENS: &[&str] = &[
    "```",
    "=>",
    "{",
    "}",
    "function(",
    "console.",
    "<script",
    "Traceback",
    "panicked at",
    "at Object.",
];

/// Words that mark text as conversational
const INDICATOR_WORDS: &[&str] = &[
    "i", "we", "you", "your", "our", "us", "my", "me", "it", "this", "that", "they", "product",
    "service", "business", "company", "team", "price", "pricing", "cost", "demo", "help", "time",
    "call", "solution", "plan", "offer", "interested", "today", "thanks", "thank",
];

const TERMINAL_PUNCTUATION: &[char] = &['.', '!', '?'];

#[derive(Debug, Clone, Default)]
pub struct ResponseSanitizer;

impl ResponseSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Clean raw model output into a speakable line
    pub fn clean(&self, raw: &str) -> Result<String, SanitizeError> {
        let stripped = strip_markup(raw);
        if stripped.is_empty() {
            return Err(SanitizeError::Empty);
        }

        let rewritten = rewrite_ai_phrases(&stripped);

        let len = rewritten.chars().count();
        if len < MIN_CHARS {
            return Err(SanitizeError::TooShort(len));
        }

        let punctuated = ensure_terminal_punctuation(&capitalize_first(&rewritten));
        let bounded = truncate_at_word(&punctuated, MAX_CHARS);

        if let Some(token) = forbidden_content(&bounded) {
            metrics::counter!("outreach_sanitizer_rejections_total").increment(1);
            return Err(SanitizeError::Forbidden(token));
        }

        Ok(bounded)
    }

    /// Whether text is already fit to speak
    pub fn validate(&self, text: &str) -> bool {
        let len = text.chars().count();
        if !(MIN_CHARS..=MAX_CHARS).contains(&len) {
            return false;
        }
        if !text.chars().next().map(char::is_uppercase).unwrap_or(false) {
            return false;
        }
        if forbidden_content(text).is_some() {
            return false;
        }
        has_indicator_word(text)
    }

    /// Clean then validate
    pub fn clean_and_validate(&self, raw: &str) -> Result<String, SanitizeError> {
        let cleaned = self.clean(raw)?;
        if !self.validate(&cleaned) {
            return Err(SanitizeError::Forbidden("no conversational content".to_string()));
        }
        Ok(cleaned)
    }
}

fn strip_markup(raw: &str) -> String {
    let text = ROLE_LABEL.replace_all(raw, "");
    let text = MARKDOWN_HEADING.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.trim();
    let quotes: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];
    text.trim_matches(quotes).trim().to_string()
}

fn rewrite_ai_phrases(text: &str) -> String {
    AI_REWRITES
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn ensure_terminal_punctuation(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.ends_with(TERMINAL_PUNCTUATION) {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed.trim_end_matches([',', ';', ':', '-']))
    }
}

/// Cut to at most `max` chars at a word boundary, ending in "..."
fn truncate_at_word(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let budget = max.saturating_sub(3);
    let head: String = text.chars().take(budget).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(idx) if idx > budget / 2 => &head[..idx],
        _ => head.as_str(),
    };
    let cut = cut.trim_end_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    format!("{}...", cut)
}

fn forbidden_content(text: &str) -> Option<String> {
    if let Some(token) = REJECT_TOKENS.iter().find(|t| text.contains(**t)) {
        return Some((*token).to_string());
    }
    if let Some(m) = NULL_WORD.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = NAN_WORD.find(text) {
        return Some(m.as_str().to_string());
    }
    AI_IDENTITY.find(text).map(|m| m.as_str().to_string())
}

fn has_indicator_word(text: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .map(|w| match w.split_once('\'') {
            Some((head, _)) => head.to_string(),
            None => w,
        })
        .any(|w| INDICATOR_WORDS.contains(&w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> ResponseSanitizer {
        ResponseSanitizer::new()
    }

    #[test]
    fn test_ai_disclosure_rewritten() {
        let cleaned = sanitizer().clean("as an AI, I think...").unwrap();
        assert!(!cleaned.to_lowercase().contains("as an ai"));
        assert!(cleaned.starts_with("As part of our team"));
        assert!(sanitizer().validate(&cleaned));
    }

    #[test]
    fn test_self_identification_rewritten() {
        let cleaned = sanitizer()
            .clean("I'm an AI language model, but I can tell you our plans start small.")
            .unwrap();
        assert!(cleaned.starts_with("I'm a member of the sales team"));
        assert!(sanitizer().validate(&cleaned));
    }

    #[test]
    fn test_too_short_rejected() {
        assert_eq!(sanitizer().clean("hi"), Err(SanitizeError::TooShort(2)));
        assert_eq!(sanitizer().clean("   "), Err(SanitizeError::Empty));
    }

    #[test]
    fn test_long_reply_truncated() {
        let raw = "We help teams like yours close more deals every quarter ".repeat(6);
        assert!(raw.chars().count() >= 300);

        let cleaned = sanitizer().clean(&raw).unwrap();
        assert!(cleaned.chars().count() <= 200);
        assert!(cleaned.ends_with("..."));
        assert!(sanitizer().validate(&cleaned));
    }

    #[test]
    fn test_labels_quotes_and_markdown_stripped() {
        let cleaned = sanitizer()
            .clean("Agent: \"**Great** question, our pricing depends on team size\"")
            .unwrap();
        assert_eq!(cleaned, "Great question, our pricing depends on team size.");
    }

    #[test]
    fn test_capitalization_and_punctuation() {
        let cleaned = sanitizer().clean("would you like a quick demo").unwrap();
        assert_eq!(cleaned, "Would you like a quick demo.");

        let cleaned = sanitizer().clean("would you like a quick demo?").unwrap();
        assert_eq!(cleaned, "Would you like a quick demo?");
    }

    #[test]
    fn test_code_and_traces_rejected() {
        let cases = [
            "Sure! ```python\nprint('hi')\n```",
            "Here is the result: {\"price\": 10}",
            "The value is undefined for your account",
            "Your discount is null at the moment",
            "Traceback (most recent call last): File x",
            "thread 'main' panicked at src/main.rs:1",
            "const f = () => console.log('hello there')",
        ];
        for case in cases {
            assert!(
                matches!(sanitizer().clean(case), Err(SanitizeError::Forbidden(_))),
                "expected rejection for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_validate_requires_indicator_word() {
        assert!(!sanitizer().validate("Blue green purple orange."));
        assert!(sanitizer().validate("Would you like to see a demo?"));
        assert!(!sanitizer().validate("would you like to see a demo?"));
        assert!(!sanitizer().validate("Short."));
    }

    #[test]
    fn test_product_talk_about_ai_is_allowed() {
        let cases = [
            "Our product is an AI-powered CRM that helps your team sell more.",
            "We use artificial intelligence to help your team follow up faster.",
            "We integrate with OpenAI and the CRM your team already uses.",
            "Our LLM features summarize every call for your reps.",
        ];
        for case in cases {
            let cleaned = sanitizer().clean(case).unwrap();
            assert_eq!(cleaned, case);
            assert!(sanitizer().validate(&cleaned), "expected {:?} to validate", case);
        }
    }

    #[test]
    fn test_surviving_identity_claims_rejected() {
        let cases = [
            "Honestly, I am actually an AI, but happy to help you today.",
            "To be clear, I'm not a real person, but I can help.",
            "I was trained by OpenAI to answer your questions.",
        ];
        for case in cases {
            assert!(
                matches!(sanitizer().clean(case), Err(SanitizeError::Forbidden(_))),
                "expected rejection for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let text = "word ".repeat(60);
        let out = truncate_at_word(text.trim(), 200);
        assert!(out.chars().count() <= 200);
        assert!(out.ends_with("word..."));
    }
}
