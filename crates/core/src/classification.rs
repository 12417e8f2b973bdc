//! Lead classification accumulated over a call
//!
//! `Classification` is the running view of a lead's interest, objections and
//! follow-up needs. It only changes through [`Classification::merge`], which
//! keeps objections and insights monotonic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Interest level inferred from the lead's utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterestLevel {
    None,
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl InterestLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse used for model output and stored rows
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "no" | "not_interested" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Follow-up task priority (5 = most urgent)
    pub fn follow_up_priority(&self) -> u8 {
        match self {
            Self::High => 5,
            Self::Medium => 4,
            Self::Unknown => 3,
            Self::Low => 2,
            Self::None => 1,
        }
    }
}

impl fmt::Display for InterestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated classification for one lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Classification {
    pub interest: InterestLevel,
    #[serde(default)]
    pub objections: BTreeSet<String>,
    #[serde(default)]
    pub needs_follow_up: bool,
    #[serde(default)]
    pub follow_up_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub insights: BTreeSet<String>,
}

/// Output of one intent analysis
///
/// Every field is optional/additive: an empty delta leaves a classification
/// unchanged when merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClassificationDelta {
    #[serde(default)]
    pub interest: Option<InterestLevel>,
    #[serde(default)]
    pub objections: Vec<String>,
    #[serde(default)]
    pub needs_follow_up: Option<bool>,
    #[serde(default)]
    pub follow_up_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub insights: Vec<String>,
}

impl ClassificationDelta {
    pub fn is_empty(&self) -> bool {
        self.interest.is_none()
            && self.objections.is_empty()
            && self.needs_follow_up.is_none()
            && self.follow_up_date.is_none()
            && self.insights.is_empty()
    }
}

impl Classification {
    /// Apply a delta.
    ///
    /// Interest takes the latest non-null value, objections and insights are
    /// unioned, follow-up fields change only when the delta carries them.
    pub fn merge(&mut self, delta: &ClassificationDelta) {
        if let Some(interest) = delta.interest {
            self.interest = interest;
        }
        for objection in &delta.objections {
            let normalized = normalize_tag(objection);
            if !normalized.is_empty() {
                self.objections.insert(normalized);
            }
        }
        for insight in &delta.insights {
            let trimmed = insight.trim();
            if !trimmed.is_empty() {
                self.insights.insert(trimmed.to_string());
            }
        }
        if let Some(needs) = delta.needs_follow_up {
            self.needs_follow_up = needs;
        }
        if let Some(date) = delta.follow_up_date {
            self.follow_up_date = Some(date);
        }
    }

    /// Non-consuming merge
    pub fn merged(&self, delta: &ClassificationDelta) -> Self {
        let mut next = self.clone();
        next.merge(delta);
        next
    }

    pub fn has_objections(&self) -> bool {
        !self.objections.is_empty()
    }

    /// One-line summary used in prompts and task notes
    pub fn summary(&self) -> String {
        let objections = if self.objections.is_empty() {
            "none".to_string()
        } else {
            self.objections.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let follow_up = match (self.needs_follow_up, self.follow_up_date) {
            (true, Some(date)) => format!("yes ({})", date.format("%Y-%m-%d")),
            (true, None) => "yes".to_string(),
            (false, _) => "no".to_string(),
        };
        format!(
            "interest: {}; objections: {}; follow-up: {}",
            self.interest, objections, follow_up
        )
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objections_union_without_duplicates() {
        let mut classification = Classification::default();
        classification.objections.insert("price".to_string());

        let delta = ClassificationDelta {
            objections: vec!["timing".to_string(), "Price".to_string()],
            ..Default::default()
        };
        classification.merge(&delta);

        let objections: Vec<_> = classification.objections.iter().cloned().collect();
        assert_eq!(objections, vec!["price".to_string(), "timing".to_string()]);
    }

    #[test]
    fn test_interest_replaced_only_when_present() {
        let mut classification = Classification {
            interest: InterestLevel::Medium,
            ..Default::default()
        };
        classification.merge(&ClassificationDelta::default());
        assert_eq!(classification.interest, InterestLevel::Medium);

        classification.merge(&ClassificationDelta {
            interest: Some(InterestLevel::Low),
            ..Default::default()
        });
        assert_eq!(classification.interest, InterestLevel::Low);
    }

    #[test]
    fn test_follow_up_kept_unless_provided() {
        let date = Utc::now();
        let mut classification = Classification::default();
        classification.merge(&ClassificationDelta {
            needs_follow_up: Some(true),
            follow_up_date: Some(date),
            ..Default::default()
        });

        classification.merge(&ClassificationDelta {
            insights: vec!["uses a competitor".to_string()],
            ..Default::default()
        });
        assert!(classification.needs_follow_up);
        assert_eq!(classification.follow_up_date, Some(date));
        assert!(classification.insights.contains("uses a competitor"));
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(InterestLevel::High.follow_up_priority(), 5);
        assert_eq!(InterestLevel::None.follow_up_priority(), 1);
        assert!(InterestLevel::Medium.follow_up_priority() > InterestLevel::Low.follow_up_priority());
    }

    #[test]
    fn test_parse_interest() {
        assert_eq!(InterestLevel::parse(" HIGH "), Some(InterestLevel::High));
        assert_eq!(InterestLevel::parse("moderate"), Some(InterestLevel::Medium));
        assert_eq!(InterestLevel::parse("maybe"), None);
    }

    #[test]
    fn test_delta_serde_defaults() {
        let delta: ClassificationDelta =
            serde_json::from_str(r#"{"interest":"high"}"#).unwrap();
        assert_eq!(delta.interest, Some(InterestLevel::High));
        assert!(delta.objections.is_empty());
        assert!(!delta.is_empty());
    }
}
