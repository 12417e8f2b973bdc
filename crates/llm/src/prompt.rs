//! Prompt assembly for sales calls
//!
//! Builds a `GenerateRequest` from the persona, lead facts, current
//! classification, call objective, knowledge excerpts and transcript.

use unicode_segmentation::UnicodeSegmentation;

use outreach_core::{GenerateRequest, HistoryEntry, Message, Role, Speaker};

/// Prompt builder for outbound sales replies
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persona/script text, always first
    pub fn with_persona(mut self, persona: &str) -> Self {
        let system = format!(
            "{}\n\n## Response Format\nRespond as if speaking on a phone call. One or two short \
             sentences, no bullet points, headers, markdown or speaker labels.",
            persona.trim()
        );
        self.messages.push(Message::system(system));
        self
    }

    /// Lead profile facts
    pub fn with_lead(mut self, facts: &str) -> Self {
        if !facts.is_empty() {
            self.messages
                .push(Message::system(format!("## Lead Profile\n{}", facts)));
        }
        self
    }

    /// Accumulated classification summary
    pub fn with_classification(mut self, summary: &str) -> Self {
        self.messages
            .push(Message::system(format!("## What We Know So Far\n{}", summary)));
        self
    }

    pub fn with_objective(mut self, objective: &str) -> Self {
        self.messages
            .push(Message::system(format!("## Call Objective\n{}", objective)));
        self
    }

    /// Knowledge-base excerpts
    pub fn with_knowledge(mut self, excerpts: &[String]) -> Self {
        if !excerpts.is_empty() {
            let context = format!(
                "## Relevant Information\n{}\n\nUse this information if it answers the lead's question.",
                excerpts.join("\n")
            );
            self.messages.push(Message::system(context));
        }
        self
    }

    /// Transcript: lead lines become user turns, agent lines assistant turns
    pub fn with_history(mut self, history: &[HistoryEntry]) -> Self {
        self.messages.extend(history.iter().map(|entry| match entry.role {
            Speaker::Lead => Message::user(entry.text.clone()),
            Speaker::Agent => Message::assistant(entry.text.clone()),
        }));
        self
    }

    pub fn user_message(mut self, message: &str) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    /// Corrective instruction appended on a retry
    pub fn with_reminder(mut self, reminder: &str) -> Self {
        self.messages.push(Message::system(reminder));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }

    /// Build with context window limit.
    ///
    /// Keeps every system message and the most recent conversation turns that
    /// fit, preserving order.
    pub fn build_with_limit(self, max_tokens: usize) -> Vec<Message> {
        let current_tokens = self.estimate_tokens();
        if current_tokens <= max_tokens {
            return self.messages;
        }

        let system_tokens: usize = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| estimate_message_tokens(&m.content))
            .sum();
        let mut available = max_tokens.saturating_sub(system_tokens);

        // Walk newest to oldest, marking conversation turns to keep
        let mut keep = vec![false; self.messages.len()];
        for (idx, msg) in self.messages.iter().enumerate().rev() {
            if msg.role == Role::System {
                keep[idx] = true;
                continue;
            }
            let tokens = estimate_message_tokens(&msg.content);
            if tokens > available {
                available = 0;
                continue;
            }
            available -= tokens;
            keep[idx] = true;
        }

        let result: Vec<Message> = self
            .messages
            .into_iter()
            .zip(keep)
            .filter_map(|(msg, keep)| keep.then_some(msg))
            .collect();

        tracing::debug!(
            from_tokens = current_tokens,
            kept_messages = result.len(),
            "Context truncated"
        );

        result
    }

    /// Final request with sampling parameters
    pub fn into_request(self, max_context_tokens: usize) -> GenerateRequest {
        GenerateRequest {
            messages: self.build_with_limit(max_context_tokens),
            ..Default::default()
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn estimate_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| estimate_message_tokens(&m.content))
            .sum()
    }
}

/// Roughly four graphemes per token for English text
fn estimate_message_tokens(content: &str) -> usize {
    content.graphemes(true).count().max(1) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_order() {
        let messages = PromptBuilder::new()
            .with_persona("You are Alex from Acme.")
            .with_lead("Name: Sam")
            .with_objective("qualify and identify needs")
            .with_knowledge(&[])
            .with_history(&[
                HistoryEntry::agent("Hi Sam, this is Alex from Acme."),
                HistoryEntry::lead("How much does it cost?"),
            ])
            .build();

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You are Alex from Acme."));
        assert_eq!(messages[3].role, Role::Assistant);
        assert_eq!(messages[4].role, Role::User);
    }

    #[test]
    fn test_build_with_limit_drops_oldest_turns() {
        let long = "word ".repeat(100);
        let history: Vec<HistoryEntry> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    HistoryEntry::agent(format!("{} {}", long, i))
                } else {
                    HistoryEntry::lead(format!("{} {}", long, i))
                }
            })
            .collect();

        let messages = PromptBuilder::new()
            .with_persona("You are Alex.")
            .with_history(&history)
            .build_with_limit(400);

        assert_eq!(messages[0].role, Role::System);
        assert!(messages.len() < 11);
        assert!(messages.last().unwrap().content.ends_with(" 9"));
    }

    #[test]
    fn test_into_request_defaults() {
        let request = PromptBuilder::new()
            .with_persona("You are Alex.")
            .user_message("hello")
            .into_request(4096);
        assert_eq!(request.messages.len(), 2);
        assert!(!request.json_mode);
    }
}
