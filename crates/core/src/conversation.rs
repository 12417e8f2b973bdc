//! Conversation types: history entries, call phases and per-turn results

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::classification::{Classification, ClassificationDelta};

/// Who spoke a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Lead,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Lead => write!(f, "Lead"),
            Speaker::Agent => write!(f, "Agent"),
        }
    }
}

/// One line of the call transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn lead(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Lead,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Agent,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Where an agent line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Generated,
    Fallback,
    /// Fixed line from the phrase table (goodbye, reprompt, closing)
    Scripted,
}

/// Immutable product of one engine call.
///
/// The engine never mutates session state; the controller applies a
/// `TurnResult` to the session in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// New history entries in speaking order
    pub entries: Vec<HistoryEntry>,
    /// Classification change inferred from the lead's utterance
    pub delta: ClassificationDelta,
    /// Text to speak next
    pub reply: String,
    pub source: ReplySource,
}

impl TurnResult {
    /// Agent-only turn (greeting, fallback greeting)
    pub fn agent_line(reply: impl Into<String>, source: ReplySource) -> Self {
        let reply = reply.into();
        Self {
            entries: vec![HistoryEntry::agent(reply.clone())],
            delta: ClassificationDelta::default(),
            reply,
            source,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ReplySource::Fallback
    }
}

/// Live conversation state for one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    history: Vec<HistoryEntry>,
    pub classification: Classification,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a classification persisted on the lead record
    pub fn with_classification(classification: Classification) -> Self {
        Self {
            history: Vec::new(),
            classification,
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn turn_count(&self) -> usize {
        self.history.len()
    }

    /// Append-only; empty lines are dropped so every entry carries text.
    pub fn push(&mut self, entry: HistoryEntry) {
        if entry.text.trim().is_empty() {
            tracing::debug!(role = %entry.role, "Dropping empty history entry");
            return;
        }
        self.history.push(entry);
    }

    /// Apply a turn result atomically
    pub fn apply(&mut self, result: &TurnResult) {
        for entry in &result.entries {
            self.push(entry.clone());
        }
        self.classification.merge(&result.delta);
    }

    pub fn last_agent_line(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|e| e.role == Speaker::Agent)
            .map(|e| e.text.as_str())
    }

    /// Transcript rendered as `Speaker: text` lines
    pub fn transcript(&self) -> String {
        self.history
            .iter()
            .map(|e| format!("{}: {}", e.role, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turn controller phases for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    #[default]
    NoSession,
    Greeting,
    AwaitingInput,
    ProcessingInput,
    Ending,
    Terminated,
}

static PHASE_TRANSITIONS: Lazy<HashMap<CallPhase, &'static [CallPhase]>> = Lazy::new(|| {
    use CallPhase::*;
    let mut map = HashMap::new();
    map.insert(NoSession, &[Greeting, AwaitingInput, ProcessingInput, Ending] as &[_]);
    map.insert(Greeting, &[AwaitingInput, Ending] as &[_]);
    map.insert(AwaitingInput, &[ProcessingInput, AwaitingInput, Ending] as &[_]);
    map.insert(ProcessingInput, &[AwaitingInput, Ending] as &[_]);
    map.insert(Ending, &[Terminated] as &[_]);
    map.insert(Terminated, &[] as &[_]);
    map
});

impl CallPhase {
    pub fn allowed_transitions(&self) -> &'static [CallPhase] {
        PHASE_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    pub fn can_transition_to(&self, target: CallPhase) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Terminated)
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::NoSession => "no_session",
            CallPhase::Greeting => "greeting",
            CallPhase::AwaitingInput => "awaiting_input",
            CallPhase::ProcessingInput => "processing_input",
            CallPhase::Ending => "ending",
            CallPhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::InterestLevel;

    #[test]
    fn test_history_is_append_only_and_non_empty() {
        let mut state = ConversationState::new();
        state.push(HistoryEntry::agent("Hi Sam, this is Alex from Acme."));
        state.push(HistoryEntry::lead("   "));
        state.push(HistoryEntry::lead("how much does it cost"));

        assert_eq!(state.turn_count(), 2);
        assert!(state.history().iter().all(|e| !e.text.trim().is_empty()));
        assert_eq!(state.history()[0].role, Speaker::Agent);
    }

    #[test]
    fn test_apply_turn_result() {
        let mut state = ConversationState::new();
        let result = TurnResult {
            entries: vec![
                HistoryEntry::lead("We might be interested"),
                HistoryEntry::agent("Great, would Tuesday work for a demo?"),
            ],
            delta: ClassificationDelta {
                interest: Some(InterestLevel::High),
                ..Default::default()
            },
            reply: "Great, would Tuesday work for a demo?".to_string(),
            source: ReplySource::Generated,
        };

        state.apply(&result);
        assert_eq!(state.turn_count(), 2);
        assert_eq!(state.classification.interest, InterestLevel::High);
        assert_eq!(
            state.last_agent_line(),
            Some("Great, would Tuesday work for a demo?")
        );
    }

    #[test]
    fn test_phase_transitions() {
        assert!(CallPhase::NoSession.can_transition_to(CallPhase::Greeting));
        assert!(CallPhase::AwaitingInput.can_transition_to(CallPhase::ProcessingInput));
        assert!(CallPhase::ProcessingInput.can_transition_to(CallPhase::Ending));
        assert!(!CallPhase::Terminated.can_transition_to(CallPhase::AwaitingInput));
        assert!(CallPhase::Terminated.is_terminal());
    }

    #[test]
    fn test_transcript_format() {
        let mut state = ConversationState::new();
        state.push(HistoryEntry::agent("Hello there."));
        state.push(HistoryEntry::lead("Hi."));
        assert_eq!(state.transcript(), "Agent: Hello there.\nLead: Hi.");
    }
}
