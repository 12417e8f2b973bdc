//! Persisted records: leads, tasks, companies, call logs
//!
//! Every row is scoped by `company_id`. Stores live in `outreach-persistence`;
//! the engine and scheduler only see these shapes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classification::Classification;
use crate::conversation::HistoryEntry;

/// A person being called
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Lead's own employer
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub classification: Option<Classification>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(id: impl Into<String>, company_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company_id: company_id.into(),
            name: name.into(),
            company: None,
            industry: None,
            custom_instructions: None,
            classification: None,
            updated_at: Utc::now(),
        }
    }

    /// Short fact line used in generation context
    pub fn facts(&self) -> String {
        let mut facts = vec![format!("Name: {}", self.name)];
        if let Some(company) = &self.company {
            facts.push(format!("Works at: {}", company));
        }
        if let Some(industry) = &self.industry {
            facts.push(format!("Industry: {}", industry));
        }
        facts.join("; ")
    }
}

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of outreach work, usually one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub company_id: String,
    pub lead_id: String,
    pub status: TaskStatus,
    /// 1 (lowest) to 5 (most urgent)
    pub priority: u8,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
}

impl Task {
    pub fn new(company_id: impl Into<String>, lead_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.into(),
            lead_id: lead_id.into(),
            status: TaskStatus::Pending,
            priority: 3,
            scheduled_at: Utc::now(),
            instructions: None,
            notes: Vec::new(),
            classification: None,
            parent_task_id: None,
        }
    }

    /// Build the follow-up for this task from the call's final classification.
    ///
    /// Priority comes from interest; due date is the requested follow-up date
    /// or one day out.
    pub fn follow_up(&self, classification: &Classification, now: DateTime<Utc>) -> Task {
        let mut lines = Vec::new();
        if !classification.insights.is_empty() {
            lines.push(format!(
                "Insights: {}",
                classification.insights.iter().cloned().collect::<Vec<_>>().join("; ")
            ));
        }
        if !classification.objections.is_empty() {
            lines.push(format!(
                "Address objections: {}",
                classification.objections.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        lines.push(format!(
            "Previous interest level: {}",
            classification.interest
        ));

        Task {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: self.company_id.clone(),
            lead_id: self.lead_id.clone(),
            status: TaskStatus::Pending,
            priority: classification.interest.follow_up_priority(),
            scheduled_at: classification
                .follow_up_date
                .unwrap_or_else(|| now + Duration::days(1)),
            instructions: Some(lines.join("\n")),
            notes: Vec::new(),
            classification: Some(classification.clone()),
            parent_task_id: Some(self.id.clone()),
        }
    }
}

/// Tenant configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Company {
    /// Name the agent introduces: product when configured, else company
    pub fn display_name(&self) -> &str {
        self.product_name.as_deref().unwrap_or(&self.name)
    }
}

/// Knowledge-base excerpt for a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub company_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeEntry {
    /// Keyword overlap with a query, case-insensitive
    pub fn relevance(&self, query: &str) -> usize {
        let haystack =
            format!("{} {} {}", self.title, self.content, self.tags.join(" ")).to_lowercase();
        query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .filter(|w| haystack.contains(*w))
            .count()
    }
}

/// How a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    #[default]
    InProgress,
    Completed,
    /// Lead asked to end or was not interested
    EndedByLead,
    /// Closed after repeated silence
    NoInput,
    Failed,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::InProgress => "in_progress",
            CallOutcome::Completed => "completed",
            CallOutcome::EndedByLead => "ended_by_lead",
            CallOutcome::NoInput => "no_input",
            CallOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(CallOutcome::InProgress),
            "completed" => Some(CallOutcome::Completed),
            "ended_by_lead" => Some(CallOutcome::EndedByLead),
            "no_input" => Some(CallOutcome::NoInput),
            "failed" => Some(CallOutcome::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call record, written on first turn and updated at the end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLog {
    pub call_id: String,
    pub lead_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub company_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: CallOutcome,
    #[serde(default)]
    pub transcript: Vec<HistoryEntry>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub recording_url: Option<String>,
}

impl CallLog {
    pub fn start(
        call_id: impl Into<String>,
        lead_id: impl Into<String>,
        task_id: Option<String>,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            lead_id: lead_id.into(),
            task_id,
            company_id: company_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: CallOutcome::InProgress,
            transcript: Vec::new(),
            classification: None,
            recording_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::InterestLevel;

    #[test]
    fn test_follow_up_task_from_high_interest() {
        let parent = Task::new("acme", "L1");
        let now = Utc::now();
        let mut classification = Classification {
            interest: InterestLevel::High,
            needs_follow_up: true,
            ..Default::default()
        };
        classification.insights.insert("wants pricing sheet".to_string());

        let task = parent.follow_up(&classification, now);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 5);
        assert_eq!(task.scheduled_at, now + Duration::days(1));
        assert_eq!(task.parent_task_id.as_deref(), Some(parent.id.as_str()));
        assert!(task
            .instructions
            .as_deref()
            .unwrap_or_default()
            .contains("wants pricing sheet"));
        assert_ne!(task.id, parent.id);
    }

    #[test]
    fn test_follow_up_uses_requested_date() {
        let parent = Task::new("acme", "L1");
        let date = Utc::now() + Duration::days(7);
        let classification = Classification {
            interest: InterestLevel::Low,
            needs_follow_up: true,
            follow_up_date: Some(date),
            ..Default::default()
        };

        let task = parent.follow_up(&classification, Utc::now());
        assert_eq!(task.scheduled_at, date);
        assert_eq!(task.priority, 2);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CallOutcome::parse("no_input"), Some(CallOutcome::NoInput));
    }

    #[test]
    fn test_company_display_name() {
        let mut company = Company {
            id: "acme".into(),
            name: "Acme Corp".into(),
            product_name: None,
            industry: None,
            instructions: None,
        };
        assert_eq!(company.display_name(), "Acme Corp");
        company.product_name = Some("Acme CRM".into());
        assert_eq!(company.display_name(), "Acme CRM");
    }

    #[test]
    fn test_knowledge_relevance() {
        let entry = KnowledgeEntry {
            id: "k1".into(),
            company_id: "acme".into(),
            title: "Pricing".into(),
            content: "Plans start at 49 dollars per seat".into(),
            tags: vec!["cost".into()],
        };
        assert_eq!(entry.relevance("what does it cost per seat"), 3);
        assert_eq!(entry.relevance("hello"), 0);
    }

    #[test]
    fn test_lead_facts() {
        let mut lead = Lead::new("L1", "acme", "Sam");
        lead.industry = Some("Retail".into());
        assert_eq!(lead.facts(), "Name: Sam; Industry: Retail");
    }
}
