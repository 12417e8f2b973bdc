//! Turn Controller
//!
//! Handles the carrier's voice webhooks. Every webhook is stateless on the
//! wire; the call's session is looked up (or rebuilt) by `CallId`, one turn
//! is run under the session lock, and a voice markup document is returned.
//!
//! Phases: `NoSession -> Greeting -> AwaitingInput -> ProcessingInput ->
//! (AwaitingInput | Ending) -> Terminated`.
//!
//! Generation inside a turn is bounded by the turn budget; when it runs out
//! the turn answers with its scripted fallback. A webhook that still misses
//! the hard stop, errors, or panics ends the call with a spoken apology and a
//! hangup, and the session is evicted.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Form,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::Instrument;

use outreach_agent::{CallContext, ConversationEngine};
use outreach_core::{
    CallLog, CallOutcome, CallPhase, ClassificationDelta, ConversationState, Error, HistoryEntry,
};

use crate::session::CallSession;
use crate::state::AppState;
use crate::twiml::{Gather, VoiceResponse};

pub const VOICE_PATH: &str = "/voice";
pub const PROCESS_INPUT_PATH: &str = "/voice-handler/process-input";
pub const RECORDING_PATH: &str = "/voice/recording";

/// Longest recording requested from the carrier
const MAX_RECORDING_SECS: u32 = 3600;

/// Served when the response document itself cannot be rendered
const HANGUP_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Hangup/></Response>";

/// Form body posted by the carrier
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhook {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub call_status: Option<String>,
    #[serde(default)]
    pub speech_result: Option<String>,
    #[serde(default)]
    pub digits: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
}

impl VoiceWebhook {
    pub fn call_id(&self) -> Option<&str> {
        non_blank(self.call_id.as_deref())
    }

    /// Recognized speech, else keypad digits
    pub fn utterance(&self) -> Option<&str> {
        non_blank(self.speech_result.as_deref()).or_else(|| non_blank(self.digits.as_deref()))
    }

    /// Outcome for a carrier status that ends the call
    pub fn terminal_outcome(&self) -> Option<CallOutcome> {
        match self.call_status.as_deref()?.trim().to_ascii_lowercase().as_str() {
            "completed" => Some(CallOutcome::Completed),
            "failed" | "busy" | "no-answer" | "canceled" => Some(CallOutcome::Failed),
            _ => None,
        }
    }
}

/// Query parameters carried on the webhook and gather action URLs
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallQuery {
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub lead_name: Option<String>,
    #[serde(default)]
    pub retry_count: Option<String>,
}

impl CallQuery {
    pub fn retry_count(&self) -> Option<u32> {
        self.retry_count.as_deref().and_then(|r| r.trim().parse().ok())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    lead_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lead_name: Option<&'a str>,
    retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Voice,
    /// Reply gather followed by a second listening window
    ProcessInput,
}

/// Result of one handled webhook
struct Turn {
    response: VoiceResponse,
    outcome: &'static str,
    /// Set when this turn ended the call
    finished: Option<CallOutcome>,
}

impl Turn {
    fn ongoing(response: VoiceResponse, outcome: &'static str) -> Self {
        Self {
            response,
            outcome,
            finished: None,
        }
    }

    fn ending(response: VoiceResponse, outcome: &'static str, call_outcome: CallOutcome) -> Self {
        Self {
            response,
            outcome,
            finished: Some(call_outcome),
        }
    }
}

/// `POST /voice`
pub async fn voice_webhook(
    State(state): State<AppState>,
    Query(query): Query<CallQuery>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Response {
    dispatch(state, query, form, Mode::Voice).await
}

/// `POST /voice-handler/process-input`
pub async fn process_input(
    State(state): State<AppState>,
    Query(query): Query<CallQuery>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Response {
    dispatch(state, query, form, Mode::ProcessInput).await
}

/// `POST /voice/recording`: attach the recording URL to the call log
pub async fn recording_webhook(
    State(state): State<AppState>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(webhook)) => match (webhook.call_id(), non_blank(webhook.recording_url.as_deref())) {
            (Some(call_id), Some(url)) => {
                state.scheduler.attach_recording(call_id, url).await;
                tracing::info!(call_id, "Recording attached");
            }
            _ => tracing::warn!("Recording callback without CallId or RecordingUrl"),
        },
        Err(rejection) => tracing::warn!(error = %rejection, "Unreadable recording callback"),
    }
    xml(&VoiceResponse::new(&state.settings.telephony))
}

async fn dispatch(
    state: AppState,
    query: CallQuery,
    form: Result<Form<VoiceWebhook>, FormRejection>,
    mode: Mode,
) -> Response {
    let webhook = match form {
        Ok(Form(webhook)) => webhook,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable webhook body");
            VoiceWebhook::default()
        }
    };
    let call_id = webhook.call_id().map(str::to_string);
    let span = tracing::info_span!(
        "webhook",
        call_id = call_id.as_deref().unwrap_or("-"),
        status = webhook.call_status.as_deref().unwrap_or("-"),
    );

    let server = &state.settings.server;
    let deadline = Instant::now() + Duration::from_millis(server.turn_budget_ms());
    let hard_stop = Duration::from_millis(server.response_deadline_ms());

    let handled = AssertUnwindSafe(
        timeout(hard_stop, handle_webhook(&state, &query, &webhook, mode, deadline)).instrument(span),
    )
    .catch_unwind()
    .await;

    let response = match handled {
        Ok(Ok(Ok(turn))) => {
            metrics::counter!("outreach_webhooks_total", "outcome" => turn.outcome).increment(1);
            turn.response
        }
        Ok(Ok(Err(e))) => abort_call(&state, call_id.as_deref(), &e).await,
        Ok(Err(_)) => {
            let error = Error::Internal(format!("no response within {}ms", hard_stop.as_millis()));
            abort_call(&state, call_id.as_deref(), &error).await
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            abort_call(&state, call_id.as_deref(), &Error::Internal(message)).await
        }
    };

    xml(&response)
}

async fn handle_webhook(
    state: &AppState,
    query: &CallQuery,
    webhook: &VoiceWebhook,
    mode: Mode,
    deadline: Instant,
) -> Result<Turn, Error> {
    let call_id = webhook
        .call_id()
        .ok_or_else(|| Error::MalformedWebhook("missing CallId".to_string()))?;
    let telephony = &state.settings.telephony;

    if let Some(outcome) = webhook.terminal_outcome() {
        finish_call(state, call_id, outcome).await;
        return Ok(Turn::ongoing(VoiceResponse::new(telephony), "status"));
    }

    let shared = match state.registry.get(call_id) {
        Some(shared) => shared,
        None => state
            .registry
            .get_or_create(
                call_id,
                non_blank(query.lead_id.as_deref()).unwrap_or_default(),
                non_blank(query.task_id.as_deref()),
            )
            .map_err(Error::from)?,
    };

    let mut guard = shared.lock().await;
    let session: &mut CallSession = &mut guard;

    if session.phase.is_terminal() {
        tracing::debug!("Webhook for a call that already ended");
        return Ok(Turn::ongoing(VoiceResponse::new(telephony).hangup(), "ignored"));
    }

    let cold = !session.initialized;
    if cold {
        initialize_session(state, session, query, deadline).await?;
    }

    let turn = match webhook.utterance() {
        None if query.retry_count().is_none() && session.state.last_agent_line().is_none() => {
            greet(state, session, deadline).await?
        }
        None => {
            if cold {
                session.retry_count = query.retry_count().unwrap_or(0);
                tracing::info!(retry_count = session.retry_count, "Rebuilt session on no-input webhook");
            }
            no_input(state, session)
        }
        Some(text) if state.deps.prompts.is_end_phrase(text) => {
            end_by_lead(state, session, text, deadline).await?
        }
        Some(text) => reply(state, session, text, mode, deadline).await?,
    };

    if turn.response.ends_call() {
        let outcome = turn.finished.unwrap_or(CallOutcome::Completed);
        if let Some(snapshot) = session.close(outcome) {
            state.scheduler.spawn_flush(snapshot);
        }
        drop(guard);
        state.registry.remove(call_id);
    }

    Ok(turn)
}

async fn initialize_session(
    state: &AppState,
    session: &mut CallSession,
    query: &CallQuery,
    deadline: Instant,
) -> Result<(), Error> {
    session.lead_name = non_blank(query.lead_name.as_deref()).map(str::to_string);
    let ctx = CallContext {
        lead_id: session.lead_id.clone(),
        task_id: session.task_id.clone(),
        lead_name: session.lead_name.clone(),
    };

    let engine = timeout_at(deadline, ConversationEngine::initialize(state.deps.clone(), &ctx))
        .await
        .map_err(|_| {
            deadline_reached("initialize");
            Error::GenerationUnavailable("engine initialization ran past the turn budget".to_string())
        })?
        .map_err(Error::from)?;

    session.state = ConversationState::with_classification(engine.initial_classification().clone());
    state
        .scheduler
        .record_call_start(&CallLog::start(
            session.call_id.clone(),
            session.lead_id.clone(),
            session.task_id.clone(),
            engine.persona().company_id.clone(),
        ))
        .await;
    session.engine = Some(engine);
    session.initialized = true;
    Ok(())
}

async fn greet(state: &AppState, session: &mut CallSession, deadline: Instant) -> Result<Turn, Error> {
    let telephony = &state.settings.telephony;
    session.advance(CallPhase::Greeting);

    let lead_name = session.lead_name.clone().unwrap_or_default();
    let result = {
        let engine = engine(session)?;
        match timeout_at(deadline, engine.greeting(&lead_name)).await {
            Ok(result) => result,
            Err(_) => {
                deadline_reached("greeting");
                engine.fallback_greeting(&lead_name)
            }
        }
    };
    session.state.apply(&result);
    session.retry_count = 0;
    session.advance(CallPhase::AwaitingInput);

    let mut response = VoiceResponse::new(telephony);
    if telephony.record_calls {
        response = response.record(absolute_url(state, RECORDING_PATH), MAX_RECORDING_SECS);
    }
    let action = action_url(state, session, 0);
    Ok(Turn::ongoing(
        response.gather(Gather::new(action, telephony).say(result.reply)),
        "greeting",
    ))
}

fn no_input(state: &AppState, session: &mut CallSession) -> Turn {
    let telephony = &state.settings.telephony;
    let prompts = &state.deps.prompts;

    if session.retry_count >= state.settings.conversation.max_no_input_retries {
        session.advance(CallPhase::Ending);
        session.state.push(HistoryEntry::agent(prompts.closing_line.clone()));
        tracing::info!(retries = session.retry_count, "Ending call after repeated silence");
        return Turn::ending(
            VoiceResponse::new(telephony)
                .say(prompts.closing_line.clone())
                .hangup(),
            "no_input_end",
            CallOutcome::NoInput,
        );
    }

    let reprompt = prompts.reprompt(session.retry_count).to_string();
    session.retry_count += 1;
    session.state.push(HistoryEntry::agent(reprompt.clone()));
    session.advance(CallPhase::AwaitingInput);

    let action = action_url(state, session, session.retry_count);
    Turn::ongoing(
        VoiceResponse::new(telephony).gather(Gather::new(action, telephony).say(reprompt)),
        "reprompt",
    )
}

async fn end_by_lead(
    state: &AppState,
    session: &mut CallSession,
    utterance: &str,
    deadline: Instant,
) -> Result<Turn, Error> {
    session.advance(CallPhase::Ending);
    let result = {
        let engine = engine(session)?;
        match timeout_at(deadline, engine.closing_turn(&session.state, utterance)).await {
            Ok(result) => result,
            Err(_) => {
                deadline_reached("closing");
                engine.goodbye_turn(&session.state, utterance, ClassificationDelta::default())
            }
        }
    };
    session.state.apply(&result);
    tracing::info!(interest = %session.state.classification.interest, "Lead ended the call");

    Ok(Turn::ending(
        VoiceResponse::new(&state.settings.telephony)
            .say(result.reply)
            .hangup(),
        "ended_by_lead",
        CallOutcome::EndedByLead,
    ))
}

async fn reply(
    state: &AppState,
    session: &mut CallSession,
    utterance: &str,
    mode: Mode,
    deadline: Instant,
) -> Result<Turn, Error> {
    let telephony = &state.settings.telephony;
    session.advance(CallPhase::ProcessingInput);

    let result = {
        let engine = engine(session)?;
        match timeout_at(deadline, engine.process_turn(&session.state, utterance)).await {
            Ok(result) => result,
            Err(_) => {
                deadline_reached("reply");
                engine.fallback_turn(utterance)
            }
        }
    };
    session.state.apply(&result);
    session.retry_count = 0;
    state
        .scheduler
        .record_turn(&session.lead_id, &session.state.classification)
        .await;
    session.advance(CallPhase::AwaitingInput);

    let action = action_url(state, session, 0);
    let response = match mode {
        Mode::Voice => VoiceResponse::new(telephony).gather(Gather::new(action, telephony).say(result.reply)),
        Mode::ProcessInput => {
            let mut first = Gather::new(action.clone(), telephony).say(result.reply);
            first.action_on_empty_result = false;
            let second = Gather::new(action, telephony).say(state.deps.prompts.reprompt(0));
            VoiceResponse::new(telephony).gather(first).gather(second)
        }
    };
    Ok(Turn::ongoing(response, "reply"))
}

/// Carrier reported the call over
async fn finish_call(state: &AppState, call_id: &str, outcome: CallOutcome) {
    let Some(shared) = state.registry.remove(call_id) else {
        tracing::debug!(call_id, outcome = outcome.as_str(), "Status for a call with no session");
        return;
    };
    let mut session = shared.lock().await;
    if session.phase.is_terminal() {
        return;
    }
    if let Some(snapshot) = session.close(outcome) {
        state.scheduler.spawn_flush(snapshot);
    }
    tracing::info!(call_id, outcome = outcome.as_str(), "Call ended by carrier status");
}

/// Apology, hangup and eviction after a failed webhook
async fn abort_call(state: &AppState, call_id: Option<&str>, error: &Error) -> VoiceResponse {
    metrics::counter!("outreach_webhooks_total", "outcome" => "error").increment(1);
    tracing::error!(call_id = call_id.unwrap_or("-"), error = %error, fatal = error.is_call_fatal(), "Webhook failed");

    if let Some(shared) = call_id.and_then(|id| state.registry.remove(id)) {
        if let Some(snapshot) = shared.lock().await.close(CallOutcome::Failed) {
            state.scheduler.spawn_flush(snapshot);
        }
    }

    VoiceResponse::new(&state.settings.telephony)
        .say(state.deps.prompts.apology.clone())
        .hangup()
}

fn engine(session: &CallSession) -> Result<&ConversationEngine, Error> {
    session
        .engine
        .as_ref()
        .ok_or_else(|| Error::Internal(format!("call {} has no engine", session.call_id)))
}

/// Generation ran into the turn budget
fn deadline_reached(call_site: &'static str) {
    metrics::counter!("outreach_turn_deadline_exceeded_total", "call_site" => call_site).increment(1);
    tracing::warn!(call_site, "Turn budget spent, answering without the model");
}

/// Gather action pointing back at `/voice` with the call's context
fn action_url(state: &AppState, session: &CallSession, retry_count: u32) -> String {
    let params = ActionParams {
        lead_id: non_blank(Some(session.lead_id.as_str())),
        task_id: session.task_id.as_deref(),
        lead_name: session.lead_name.as_deref(),
        retry_count,
    };
    let base = absolute_url(state, VOICE_PATH);
    match serde_urlencoded::to_string(&params) {
        Ok(encoded) => format!("{}?{}", base, encoded),
        Err(e) => {
            tracing::warn!(error = %e, "Could not encode gather action parameters");
            format!("{}?retryCount={}", base, retry_count)
        }
    }
}

fn absolute_url(state: &AppState, path: &str) -> String {
    match state.settings.server.public_base_url.as_deref() {
        Some(base) if !base.trim().is_empty() => format!("{}{}", base.trim_end_matches('/'), path),
        _ => path.to_string(),
    }
}

fn xml(response: &VoiceResponse) -> Response {
    let body = match response.render() {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Voice markup rendering failed");
            HANGUP_XML.to_string()
        }
    };
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_prefers_speech() {
        let webhook = VoiceWebhook {
            call_id: Some("CA1".into()),
            speech_result: Some("  tell me more ".into()),
            digits: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(webhook.utterance(), Some("tell me more"));

        let keypad = VoiceWebhook {
            speech_result: Some("   ".into()),
            digits: Some("2".into()),
            ..Default::default()
        };
        assert_eq!(keypad.utterance(), Some("2"));
        assert_eq!(VoiceWebhook::default().utterance(), None);
    }

    #[test]
    fn test_terminal_outcome() {
        let status = |s: &str| VoiceWebhook {
            call_status: Some(s.into()),
            ..Default::default()
        };
        assert_eq!(status("completed").terminal_outcome(), Some(CallOutcome::Completed));
        assert_eq!(status("Failed").terminal_outcome(), Some(CallOutcome::Failed));
        assert_eq!(status("no-answer").terminal_outcome(), Some(CallOutcome::Failed));
        assert_eq!(status("in-progress").terminal_outcome(), None);
        assert_eq!(VoiceWebhook::default().terminal_outcome(), None);
    }

    #[test]
    fn test_retry_count_parsing() {
        let query = CallQuery {
            retry_count: Some("2".into()),
            ..Default::default()
        };
        assert_eq!(query.retry_count(), Some(2));
        let bad = CallQuery {
            retry_count: Some("two".into()),
            ..Default::default()
        };
        assert_eq!(bad.retry_count(), None);
        assert_eq!(CallQuery::default().retry_count(), None);
    }

    #[test]
    fn test_blank_call_id_is_missing() {
        let webhook = VoiceWebhook {
            call_id: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(webhook.call_id(), None);
    }
}
