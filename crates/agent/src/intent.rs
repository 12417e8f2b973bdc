//! Intent classification
//!
//! Turns one lead utterance into a [`ClassificationDelta`] through the
//! structured-output capability. Analysis is best-effort: any failure yields
//! an empty delta, which leaves the prior classification unchanged once
//! merged.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use outreach_core::{
    Classification, ClassificationDelta, GenerateRequest, InterestLevel, LanguageModel,
};

use crate::retry::RetryPolicy;

static DELTA_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "interest": {
                "type": "string",
                "enum": ["none", "low", "medium", "high", "unknown"]
            },
            "objections": {"type": "array", "items": {"type": "string"}},
            "needs_follow_up": {"type": "boolean"},
            "follow_up_date": {"type": ["string", "null"]},
            "insights": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["interest"]
    })
});

const INSTRUCTIONS: &str = "You analyse one utterance from a sales call lead. \
Return a JSON object with: interest (none, low, medium, high or unknown), \
objections (short lowercase tags such as price, timing, competitor, authority, need), \
needs_follow_up (true when the lead asks to be contacted later or shows interest), \
follow_up_date (ISO date if the lead names one, otherwise null) and insights \
(short facts about the lead's business or needs). Return only the JSON object.";

/// Raw shape returned by the model
#[derive(Debug, Deserialize)]
struct RawDelta {
    interest: String,
    #[serde(default)]
    objections: Vec<String>,
    #[serde(default)]
    needs_follow_up: Option<bool>,
    #[serde(default)]
    follow_up_date: Option<String>,
    #[serde(default)]
    insights: Vec<String>,
}

pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self { llm, policy }
    }

    pub fn schema() -> &'static Value {
        &DELTA_SCHEMA
    }

    /// Analyse an utterance against the prior classification. Never fails.
    pub async fn analyze(&self, utterance: &str, prior: &Classification) -> ClassificationDelta {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return ClassificationDelta::default();
        }

        let result = self
            .policy
            .run("classification", |_| {
                let request = GenerateRequest::new(INSTRUCTIONS)
                    .with_user_message(format!(
                        "Known so far: {}\nLead said: \"{}\"",
                        prior.summary(),
                        utterance
                    ))
                    .with_temperature(0.0)
                    .with_json_mode(true);
                self.llm.generate_structured(request, &DELTA_SCHEMA)
            })
            .await;

        match result.and_then(|value| Ok(serde_json::from_value::<RawDelta>(value)?)) {
            Ok(raw) => {
                let delta = to_delta(raw);
                tracing::debug!(
                    interest = ?delta.interest,
                    objections = delta.objections.len(),
                    needs_follow_up = ?delta.needs_follow_up,
                    "Utterance classified"
                );
                delta
            }
            Err(e) => {
                metrics::counter!("outreach_classification_failures_total").increment(1);
                tracing::warn!(error = %e, "Classification failed, keeping prior classification");
                ClassificationDelta::default()
            }
        }
    }
}

fn to_delta(raw: RawDelta) -> ClassificationDelta {
    ClassificationDelta {
        interest: InterestLevel::parse(&raw.interest),
        objections: raw
            .objections
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
        needs_follow_up: raw.needs_follow_up,
        follow_up_date: raw.follow_up_date.as_deref().and_then(parse_date),
        insights: raw
            .insights
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect(),
    }
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (taken as midnight UTC)
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use outreach_core::{Error, GenerateResponse, Result};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Returns queued structured results in order
    struct ScriptedLlm {
        structured: Mutex<VecDeque<Result<Value>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedLlm {
        fn new(results: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                structured: Mutex::new(results.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse::text("unused"))
        }

        async fn generate_structured(&self, _request: GenerateRequest, _schema: &Value) -> Result<Value> {
            *self.calls.lock() += 1;
            self.structured
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::GenerationUnavailable("script exhausted".into())))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_analyze_maps_fields() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "interest": "high",
            "objections": ["Price", " "],
            "needs_follow_up": true,
            "follow_up_date": "2026-11-03",
            "insights": ["Runs 3 stores"]
        }))]);
        let classifier = IntentClassifier::new(llm, RetryPolicy::immediate(2));

        let delta = classifier
            .analyze("Sounds great, call me next Tuesday", &Classification::default())
            .await;

        assert_eq!(delta.interest, Some(InterestLevel::High));
        assert_eq!(delta.objections, vec!["Price".to_string()]);
        assert_eq!(delta.needs_follow_up, Some(true));
        assert_eq!(
            delta.follow_up_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2026-11-03".to_string())
        );
        assert_eq!(delta.insights, vec!["Runs 3 stores".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_delta() {
        let llm = ScriptedLlm::new(vec![
            Err(Error::GenerationInvalid("not json".into())),
            Err(Error::GenerationInvalid("still not json".into())),
        ]);
        let classifier = IntentClassifier::new(llm.clone(), RetryPolicy::immediate(2));

        let prior = Classification {
            interest: InterestLevel::Medium,
            ..Default::default()
        };
        let delta = classifier.analyze("hmm", &prior).await;

        assert!(delta.is_empty());
        assert_eq!(prior.merged(&delta), prior);
        assert_eq!(*llm.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let llm = ScriptedLlm::new(vec![
            Err(Error::GenerationInvalid("bad".into())),
            Ok(json!({"interest": "low"})),
        ]);
        let classifier = IntentClassifier::new(llm, RetryPolicy::immediate(2));

        let delta = classifier.analyze("maybe", &Classification::default()).await;
        assert_eq!(delta.interest, Some(InterestLevel::Low));
        assert_eq!(delta.needs_follow_up, None);
    }

    #[tokio::test]
    async fn test_empty_utterance_skips_model() {
        let llm = ScriptedLlm::new(vec![]);
        let classifier = IntentClassifier::new(llm.clone(), RetryPolicy::immediate(2));
        assert!(classifier.analyze("   ", &Classification::default()).await.is_empty());
        assert_eq!(*llm.calls.lock(), 0);
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2026-11-03T15:00:00Z").is_some());
        assert!(parse_date("2026-11-03").is_some());
        assert!(parse_date("next tuesday").is_none());
    }
}
