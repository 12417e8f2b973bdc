//! Conversation engine
//!
//! One engine per call. It resolves the persona once at initialization and
//! then produces an immutable [`TurnResult`] per turn; the caller owns the
//! [`ConversationState`] and applies results to it.
//!
//! Turn pipeline:
//! 1. Record the lead's utterance
//! 2. Classify it (best-effort)
//! 3. Assemble context: persona, lead facts, classification, objective,
//!    knowledge excerpts, transcript
//! 4. Generate, sanitize and validate, retrying with a corrective reminder
//! 5. Fall back to a keyword-selected canned reply when attempts run out

use std::sync::Arc;
use std::time::Instant;

use outreach_config::{render_template, PromptsConfig, Settings};
use outreach_core::{
    Classification, ClassificationDelta, Company, ConversationState, GenerateRequest, HistoryEntry, InterestLevel,
    LanguageModel, Lead, RecordStores, ReplySource, Task, TurnResult,
};
use outreach_llm::PromptBuilder;

use crate::fallback::{fallback_greeting, goodbye, select_fallback};
use crate::intent::IntentClassifier;
use crate::retry::RetryPolicy;
use crate::sanitizer::{ResponseSanitizer, SanitizeError};
use crate::AgentError;

/// Tunables for one engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub greeting_policy: RetryPolicy,
    pub reply_policy: RetryPolicy,
    pub classification_policy: RetryPolicy,
    pub default_company_name: String,
    pub default_agent_name: String,
    pub knowledge_excerpts: usize,
    /// Completion budget per reply
    pub max_tokens: u32,
    pub temperature: f32,
    /// Prompt budget before the oldest turns are dropped
    pub max_context_tokens: usize,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let conversation = &settings.conversation;
        Self {
            greeting_policy: RetryPolicy::greeting(conversation),
            reply_policy: RetryPolicy::reply(conversation),
            classification_policy: RetryPolicy::classification(conversation),
            default_company_name: conversation.default_company_name.clone(),
            default_agent_name: conversation.default_agent_name.clone(),
            knowledge_excerpts: conversation.knowledge_excerpts,
            max_tokens: settings.llm.max_tokens,
            temperature: settings.llm.temperature,
            max_context_tokens: 4096,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Shared collaborators handed to every engine
#[derive(Clone)]
pub struct EngineDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub stores: RecordStores,
    pub prompts: Arc<PromptsConfig>,
    pub config: EngineConfig,
}

/// Identifiers carried by the call's webhooks
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub lead_id: String,
    pub task_id: Option<String>,
    /// Name passed by the dialer, used when the lead record has none
    pub lead_name: Option<String>,
}

/// Who the agent is on this call
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub script: String,
    pub agent_name: String,
    pub company_name: String,
    pub company_id: String,
    pub lead_name: String,
    pub lead_facts: String,
}

impl Persona {
    /// Resolve the persona script.
    ///
    /// Precedence: task instructions, lead custom instructions, company
    /// instructions, then the default template.
    pub fn resolve(
        prompts: &PromptsConfig,
        config: &EngineConfig,
        ctx: &CallContext,
        lead: Option<&Lead>,
        task: Option<&Task>,
        company: Option<&Company>,
    ) -> Self {
        let agent_name = config.default_agent_name.clone();
        let company_name = company
            .map(|c| c.display_name().to_string())
            .unwrap_or_else(|| config.default_company_name.clone());

        let custom = task
            .and_then(|t| non_empty(t.instructions.as_deref()))
            .or_else(|| lead.and_then(|l| non_empty(l.custom_instructions.as_deref())))
            .or_else(|| company.and_then(|c| non_empty(c.instructions.as_deref())));

        let script = match custom {
            Some(instructions) => format!(
                "You are {} calling on behalf of {}.\n{}",
                agent_name, company_name, instructions
            ),
            None => render_template(
                &prompts.default_persona,
                &[("agent_name", &agent_name), ("company_name", &company_name)],
            ),
        };

        let lead_name = lead
            .map(|l| l.name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| ctx.lead_name.clone())
            .unwrap_or_default();

        let company_id = company
            .map(|c| c.id.clone())
            .or_else(|| task.map(|t| t.company_id.clone()))
            .or_else(|| lead.map(|l| l.company_id.clone()))
            .unwrap_or_default();

        let lead_facts = match lead {
            Some(lead) => lead.facts(),
            None if !lead_name.is_empty() => format!("Name: {}", lead_name),
            None => String::new(),
        };

        Self {
            script,
            agent_name,
            company_name,
            company_id,
            lead_name,
            lead_facts,
        }
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Prompt-only call objective from the running classification
pub fn objective(classification: &Classification) -> String {
    match classification.interest {
        InterestLevel::High => "schedule next step".to_string(),
        InterestLevel::Medium => "address objections and build interest".to_string(),
        _ if classification.has_objections() => format!(
            "address objections: {}",
            classification
                .objections
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ),
        _ => "qualify and identify needs".to_string(),
    }
}

pub struct ConversationEngine {
    deps: EngineDeps,
    persona: Persona,
    classifier: IntentClassifier,
    sanitizer: ResponseSanitizer,
    initial_classification: Classification,
}

impl ConversationEngine {
    /// Resolve context for a call.
    ///
    /// Fails only when the generation capability is unreachable; record
    /// lookup failures fall back to defaults.
    pub async fn initialize(deps: EngineDeps, ctx: &CallContext) -> Result<Self, AgentError> {
        if !deps.llm.is_available().await {
            return Err(AgentError::Unavailable(format!(
                "{} is not reachable",
                deps.llm.model_name()
            )));
        }

        let lead = lookup("lead", &ctx.lead_id, deps.stores.leads.get(&ctx.lead_id).await);
        let task = match &ctx.task_id {
            Some(task_id) => lookup("task", task_id, deps.stores.tasks.get(task_id).await),
            None => None,
        };

        let company_id = task
            .as_ref()
            .map(|t| t.company_id.clone())
            .or_else(|| lead.as_ref().map(|l| l.company_id.clone()));
        let company = match &company_id {
            Some(id) => lookup("company", id, deps.stores.companies.get(id).await),
            None => None,
        };

        let persona = Persona::resolve(
            &deps.prompts,
            &deps.config,
            ctx,
            lead.as_ref(),
            task.as_ref(),
            company.as_ref(),
        );
        let initial_classification = lead
            .as_ref()
            .and_then(|l| l.classification.clone())
            .unwrap_or_default();

        tracing::info!(
            lead_id = %ctx.lead_id,
            task_id = ?ctx.task_id,
            company = %persona.company_name,
            "Conversation engine initialized"
        );

        let classifier =
            IntentClassifier::new(deps.llm.clone(), deps.config.classification_policy);

        Ok(Self {
            deps,
            persona,
            classifier,
            sanitizer: ResponseSanitizer::new(),
            initial_classification,
        })
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Classification stored on the lead before this call
    pub fn initial_classification(&self) -> &Classification {
        &self.initial_classification
    }

    pub fn prompts(&self) -> &PromptsConfig {
        &self.deps.prompts
    }

    /// Opening line. Must mention the company; falls back to a fixed template.
    pub async fn greeting(&self, lead_name: &str) -> TurnResult {
        let lead_name = self.lead_display_name(lead_name);
        let prompts = &self.deps.prompts;
        let instruction = render_template(
            &prompts.greeting_instruction,
            &[
                ("lead_name", if lead_name.is_empty() { "the lead" } else { lead_name }),
                ("company_name", &self.persona.company_name),
            ],
        );

        let result = self
            .deps
            .config
            .greeting_policy
            .run("greeting", |attempt| {
                let mut builder = PromptBuilder::new()
                    .with_persona(&self.persona.script)
                    .with_lead(&self.persona.lead_facts)
                    .user_message(&instruction);
                if attempt > 1 {
                    builder = builder.with_reminder(&prompts.corrective_reminder);
                }
                self.generate_line(builder, "greeting", true)
            })
            .await;

        match result {
            Ok(line) => TurnResult::agent_line(line, ReplySource::Generated),
            Err(e) => {
                tracing::warn!(error = %e, "Greeting generation failed, using fallback");
                self.fallback_greeting(lead_name)
            }
        }
    }

    /// Fixed-template greeting naming the agent and company
    pub fn fallback_greeting(&self, lead_name: &str) -> TurnResult {
        metrics::counter!("outreach_fallbacks_total", "kind" => "greeting").increment(1);
        TurnResult::agent_line(
            fallback_greeting(
                &self.deps.prompts,
                self.lead_display_name(lead_name),
                &self.persona.agent_name,
                &self.persona.company_name,
            ),
            ReplySource::Fallback,
        )
    }

    fn lead_display_name<'a>(&'a self, lead_name: &'a str) -> &'a str {
        if lead_name.trim().is_empty() {
            self.persona.lead_name.as_str()
        } else {
            lead_name
        }
    }

    /// Produce the agent's reply to one lead utterance. Never empty.
    pub async fn process_turn(&self, state: &ConversationState, utterance: &str) -> TurnResult {
        let started = Instant::now();
        let lead_entry = HistoryEntry::lead(utterance);

        let delta = self.classifier.analyze(utterance, &state.classification).await;
        let merged = state.classification.merged(&delta);
        let knowledge = self.knowledge_excerpts(utterance).await;

        let mut history = state.history().to_vec();
        history.push(lead_entry.clone());

        let summary = merged.summary();
        let goal = objective(&merged);
        let prompts = &self.deps.prompts;

        let result = self
            .deps
            .config
            .reply_policy
            .run("reply", |attempt| {
                let mut builder = PromptBuilder::new()
                    .with_persona(&self.persona.script)
                    .with_lead(&self.persona.lead_facts)
                    .with_classification(&summary)
                    .with_objective(&goal)
                    .with_knowledge(&knowledge)
                    .with_history(&history);
                if attempt > 1 {
                    builder = builder.with_reminder(&prompts.corrective_reminder);
                }
                self.generate_line(builder, "reply", false)
            })
            .await;

        let turn = match result {
            Ok(reply) => TurnResult {
                entries: vec![lead_entry, HistoryEntry::agent(reply.clone())],
                delta,
                reply,
                source: ReplySource::Generated,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Reply generation failed, using fallback");
                TurnResult {
                    delta,
                    ..self.fallback_turn(utterance)
                }
            }
        };

        metrics::histogram!("outreach_turn_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::debug!(
            objective = %goal,
            source = ?turn.source,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn processed"
        );

        turn
    }

    /// Keyword-selected canned reply to `utterance`, with no classification change
    pub fn fallback_turn(&self, utterance: &str) -> TurnResult {
        let (kind, line) = select_fallback(&self.deps.prompts, utterance);
        metrics::counter!("outreach_fallbacks_total", "kind" => kind.as_str()).increment(1);
        TurnResult {
            entries: vec![HistoryEntry::lead(utterance), HistoryEntry::agent(line)],
            delta: ClassificationDelta::default(),
            reply: line.to_string(),
            source: ReplySource::Fallback,
        }
    }

    /// Final turn when the lead asks to end the call.
    ///
    /// The utterance is still classified so the insight flush sees it; the
    /// reply is the goodbye for the resulting interest level.
    pub async fn closing_turn(&self, state: &ConversationState, utterance: &str) -> TurnResult {
        let delta = self.classifier.analyze(utterance, &state.classification).await;
        self.goodbye_turn(state, utterance, delta)
    }

    /// Goodbye for the interest level after `delta` is merged
    pub fn goodbye_turn(
        &self,
        state: &ConversationState,
        utterance: &str,
        delta: ClassificationDelta,
    ) -> TurnResult {
        let interest = state.classification.merged(&delta).interest;
        let reply = goodbye(&self.deps.prompts, interest, &self.persona.lead_name);

        TurnResult {
            entries: vec![HistoryEntry::lead(utterance), HistoryEntry::agent(reply.clone())],
            delta,
            reply,
            source: ReplySource::Scripted,
        }
    }

    /// One generation attempt: generate, clean, validate
    async fn generate_line(
        &self,
        builder: PromptBuilder,
        call_site: &'static str,
        require_company: bool,
    ) -> Result<String, AgentError> {
        metrics::counter!("outreach_generation_attempts_total", "call_site" => call_site)
            .increment(1);

        let request: GenerateRequest = builder
            .into_request(self.deps.config.max_context_tokens)
            .with_max_tokens(self.deps.config.max_tokens)
            .with_temperature(self.deps.config.temperature);

        let response = self.deps.llm.generate(request).await?;
        let line = self.sanitizer.clean(&response.text)?;
        if !self.sanitizer.validate(&line) {
            return Err(SanitizeError::Forbidden("no conversational content".to_string()).into());
        }
        if require_company
            && !line
                .to_lowercase()
                .contains(&self.persona.company_name.to_lowercase())
        {
            return Err(AgentError::MissingCompanyName(self.persona.company_name.clone()));
        }
        Ok(line)
    }

    async fn knowledge_excerpts(&self, utterance: &str) -> Vec<String> {
        let limit = self.deps.config.knowledge_excerpts;
        if limit == 0 || self.persona.company_id.is_empty() {
            return Vec::new();
        }
        match self
            .deps
            .stores
            .knowledge
            .search(&self.persona.company_id, utterance, limit)
            .await
        {
            Ok(entries) => entries
                .into_iter()
                .map(|e| format!("{}: {}", e.title, e.content))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Knowledge search failed");
                Vec::new()
            }
        }
    }
}

fn lookup<T>(kind: &str, id: &str, result: outreach_core::Result<Option<T>>) -> Option<T> {
    match result {
        Ok(Some(record)) => Some(record),
        Ok(None) => {
            tracing::debug!(kind, id, "Record not found, using defaults");
            None
        }
        Err(e) => {
            tracing::warn!(kind, id, error = %e, "Context lookup failed, using defaults");
            None
        }
    }
}
