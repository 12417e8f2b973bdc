//! Call Session Registry
//!
//! Per-call state that survives between the carrier's stateless webhooks.
//!
//! The registry is a best-effort cache: sessions live only in this process.
//! Each session sits behind an async mutex held for a whole turn, so
//! overlapping webhooks for one call are serialized while different calls
//! proceed independently.
//!
//! - `SessionRegistry` - injected trait used by the turn controller
//! - `InMemorySessionRegistry` - default, sharded concurrent map

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

use outreach_agent::{CallSnapshot, ConversationEngine, FollowUpScheduler};
use outreach_config::ServerConfig;
use outreach_core::{CallOutcome, CallPhase, ConversationState};

use crate::ServerError;

/// Shared handle to one call's session
pub type SharedSession = Arc<Mutex<CallSession>>;

/// State for one phone call
pub struct CallSession {
    pub call_id: String,
    pub lead_id: String,
    pub task_id: Option<String>,
    pub lead_name: Option<String>,
    pub state: ConversationState,
    /// Present once the engine has been initialized for this call
    pub engine: Option<ConversationEngine>,
    /// Consecutive no-input webhooks
    pub retry_count: u32,
    pub initialized: bool,
    pub phase: CallPhase,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>, lead_id: impl Into<String>, task_id: Option<String>) -> Self {
        Self {
            call_id: call_id.into(),
            lead_id: lead_id.into(),
            task_id,
            lead_name: None,
            state: ConversationState::new(),
            engine: None,
            retry_count: 0,
            initialized: false,
            phase: CallPhase::NoSession,
            created_at: Utc::now(),
        }
    }

    /// Move to `target`, logging transitions the state machine does not allow
    pub fn advance(&mut self, target: CallPhase) {
        if self.phase != target && !self.phase.can_transition_to(target) {
            tracing::warn!(
                call_id = %self.call_id,
                from = %self.phase,
                to = %target,
                "Unexpected call phase transition"
            );
        }
        self.phase = target;
    }

    /// Post-call snapshot handed to the follow-up scheduler
    pub fn snapshot(&self, outcome: CallOutcome) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id.clone(),
            lead_id: self.lead_id.clone(),
            task_id: self.task_id.clone(),
            company_id: self
                .engine
                .as_ref()
                .map(|e| e.persona().company_id.clone())
                .unwrap_or_default(),
            classification: self.state.classification.clone(),
            transcript: self.state.history().to_vec(),
            outcome,
        }
    }

    /// Terminate the call. Returns the snapshot to flush, or `None` when the
    /// call already ended or never reached the engine.
    pub fn close(&mut self, outcome: CallOutcome) -> Option<CallSnapshot> {
        if self.phase.is_terminal() {
            return None;
        }
        if self.phase != CallPhase::Ending {
            self.advance(CallPhase::Ending);
        }
        self.advance(CallPhase::Terminated);
        self.initialized.then(|| self.snapshot(outcome))
    }

    /// Introspection view
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "call_id": self.call_id,
            "lead_id": self.lead_id,
            "task_id": self.task_id,
            "phase": self.phase,
            "initialized": self.initialized,
            "retry_count": self.retry_count,
            "turn_count": self.state.turn_count(),
            "interest": self.state.classification.interest,
            "company": self.engine.as_ref().map(|e| e.persona().company_name.clone()),
            "created_at": self.created_at,
        })
    }
}

/// Lock-free listing entry
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub call_id: String,
    pub lead_id: String,
    pub idle_secs: u64,
}

/// Session store used by the turn controller
pub trait SessionRegistry: Send + Sync {
    /// Existing session for `call_id`, or a fresh one. Never replaces an entry.
    fn get_or_create(
        &self,
        call_id: &str,
        lead_id: &str,
        task_id: Option<&str>,
    ) -> Result<SharedSession, ServerError>;

    fn get(&self, call_id: &str) -> Option<SharedSession>;

    fn remove(&self, call_id: &str) -> Option<SharedSession>;

    fn count(&self) -> usize;

    fn list(&self) -> Vec<SessionSummary>;
}

struct SessionSlot {
    session: SharedSession,
    lead_id: String,
    last_activity: RwLock<Instant>,
}

impl SessionSlot {
    fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }
}

/// In-memory registry keyed by call id
pub struct InMemorySessionRegistry {
    sessions: DashMap<String, SessionSlot>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
    /// Flushes swept calls; without it expired sessions are only dropped
    scheduler: Option<FollowUpScheduler>,
}

impl InMemorySessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_config(
            max_sessions,
            Duration::from_secs(outreach_config::constants::sessions::IDLE_TIMEOUT_SECS),
            Duration::from_secs(outreach_config::constants::sessions::CLEANUP_INTERVAL_SECS),
        )
    }

    pub fn with_config(max_sessions: usize, session_timeout: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            session_timeout,
            cleanup_interval,
            scheduler: None,
        }
    }

    /// Flush swept calls as failed through `scheduler`
    pub fn with_scheduler(mut self, scheduler: FollowUpScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::with_config(
            config.max_sessions,
            Duration::from_secs(config.session_timeout_secs),
            Duration::from_secs(config.cleanup_interval_secs),
        )
    }

    /// Spawn the idle-session sweeper.
    ///
    /// Removes sessions whose terminal webhook never arrived. Send `true` on
    /// the returned channel to stop it.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = registry.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = registry.count(),
                                "Session cleanup removed idle calls"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Evict sessions idle longer than the timeout; returns how many went.
    ///
    /// Evicted calls that reached the engine are closed as failed and
    /// flushed in the background, so their call log and follow-up task are
    /// written even though no terminal webhook arrived.
    pub fn cleanup_expired(&self) -> usize {
        let timeout = self.session_timeout;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|slot| slot.is_expired(timeout))
            .map(|slot| slot.key().clone())
            .collect();

        let evicted: Vec<SharedSession> = expired
            .iter()
            .filter_map(|call_id| {
                let (_, slot) = self
                    .sessions
                    .remove_if(call_id, |_, slot| slot.is_expired(timeout))?;
                tracing::info!(call_id = %call_id, "Expired idle call session");
                Some(slot.session)
            })
            .collect();

        self.update_gauge();
        let removed = evicted.len();
        if removed > 0 {
            metrics::counter!("outreach_sessions_expired_total").increment(removed as u64);
            self.flush_evicted(evicted);
        }
        removed
    }

    fn flush_evicted(&self, evicted: Vec<SharedSession>) {
        let Some(scheduler) = self.scheduler.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(count = evicted.len(), "No runtime to flush expired calls");
            return;
        };
        runtime.spawn(async move {
            for shared in evicted {
                let snapshot = shared.lock().await.close(CallOutcome::Failed);
                if let Some(snapshot) = snapshot {
                    tracing::info!(call_id = %snapshot.call_id, "Flushing expired call");
                    scheduler.flush(snapshot).await;
                }
            }
        });
    }

    fn update_gauge(&self) {
        metrics::gauge!("outreach_active_sessions").set(self.sessions.len() as f64);
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn get_or_create(
        &self,
        call_id: &str,
        lead_id: &str,
        task_id: Option<&str>,
    ) -> Result<SharedSession, ServerError> {
        if let Some(slot) = self.sessions.get(call_id) {
            slot.touch();
            return Ok(slot.session.clone());
        }

        if self.sessions.len() >= self.max_sessions {
            self.cleanup_expired();
            if self.sessions.len() >= self.max_sessions {
                return Err(ServerError::Capacity(self.max_sessions));
            }
        }

        let session = match self.sessions.entry(call_id.to_string()) {
            Entry::Occupied(slot) => {
                slot.get().touch();
                slot.get().session.clone()
            }
            Entry::Vacant(vacant) => {
                let session = Arc::new(Mutex::new(CallSession::new(
                    call_id,
                    lead_id,
                    task_id.map(str::to_string),
                )));
                vacant.insert(SessionSlot {
                    session: session.clone(),
                    lead_id: lead_id.to_string(),
                    last_activity: RwLock::new(Instant::now()),
                });
                tracing::info!(call_id, lead_id, "Created call session");
                session
            }
        };
        self.update_gauge();
        Ok(session)
    }

    fn get(&self, call_id: &str) -> Option<SharedSession> {
        self.sessions.get(call_id).map(|slot| {
            slot.touch();
            slot.session.clone()
        })
    }

    fn remove(&self, call_id: &str) -> Option<SharedSession> {
        let removed = self.sessions.remove(call_id).map(|(_, slot)| slot.session);
        if removed.is_some() {
            tracing::info!(call_id, "Removed call session");
            self.update_gauge();
        }
        removed
    }

    fn count(&self) -> usize {
        self.sessions.len()
    }

    fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|slot| SessionSummary {
                call_id: slot.key().clone(),
                lead_id: slot.lead_id.clone(),
                idle_secs: slot.last_activity.read().elapsed().as_secs(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = InMemorySessionRegistry::new(10);
        let first = registry.get_or_create("CA1", "L1", None).unwrap();
        first.lock().await.retry_count = 1;

        let second = registry.get_or_create("CA1", "L2", Some("T9")).unwrap();
        let session = second.lock().await;
        assert_eq!(session.lead_id, "L1");
        assert_eq!(session.retry_count, 1);
        assert!(session.task_id.is_none());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_session() {
        let registry = Arc::new(InMemorySessionRegistry::new(10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("CA1", "L1", None).unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }
        assert_eq!(registry.count(), 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_remove_and_list() {
        let registry = InMemorySessionRegistry::new(10);
        registry.get_or_create("CA1", "L1", None).unwrap();
        registry.get_or_create("CA2", "L2", None).unwrap();

        let mut ids: Vec<String> = registry.list().into_iter().map(|s| s.call_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["CA1".to_string(), "CA2".to_string()]);

        assert!(registry.remove("CA1").is_some());
        assert!(registry.remove("CA1").is_none());
        assert!(registry.get("CA1").is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_capacity_guard() {
        let registry = InMemorySessionRegistry::new(1);
        registry.get_or_create("CA1", "L1", None).unwrap();
        assert!(matches!(
            registry.get_or_create("CA2", "L2", None),
            Err(ServerError::Capacity(1))
        ));
        assert!(registry.get_or_create("CA1", "L1", None).is_ok());
    }

    #[test]
    fn test_cleanup_expired() {
        let registry =
            InMemorySessionRegistry::with_config(10, Duration::ZERO, Duration::from_secs(60));
        registry.get_or_create("CA1", "L1", None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.cleanup_expired(), 1);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_flushes_expired_calls() {
        use outreach_core::{CallLog, Task, TaskStatus};
        use outreach_persistence::InMemoryRecords;

        let records = InMemoryRecords::new();
        let stores = records.stores();
        let parent = Task::new("co1", "L1");
        stores.tasks.upsert(&parent).await.unwrap();
        let scheduler = FollowUpScheduler::new(stores.clone());
        scheduler
            .record_call_start(&CallLog::start("CA1", "L1", Some(parent.id.clone()), "co1"))
            .await;

        let registry = InMemorySessionRegistry::with_config(10, Duration::ZERO, Duration::from_secs(60))
            .with_scheduler(scheduler);
        let shared = registry.get_or_create("CA1", "L1", Some(parent.id.as_str())).unwrap();
        {
            let mut session = shared.lock().await;
            session.initialized = true;
            session.advance(CallPhase::Greeting);
            session.advance(CallPhase::AwaitingInput);
            session.state.classification.needs_follow_up = true;
        }
        // Never initialized: dropped without a flush
        registry.get_or_create("CA2", "L2", None).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(registry.cleanup_expired(), 2);
        assert_eq!(registry.count(), 0);

        let mut flushed = false;
        for _ in 0..100 {
            let log = stores.call_logs.get("CA1").await.unwrap().unwrap();
            if log.status == CallOutcome::Failed {
                flushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed, "expired call was never flushed");
        assert!(shared.lock().await.phase.is_terminal());

        let tasks = stores.tasks.list_for_lead("L1").await.unwrap();
        assert!(tasks
            .iter()
            .any(|t| t.parent_task_id.as_deref() == Some(parent.id.as_str())
                && t.status == TaskStatus::Pending));
        assert!(stores.call_logs.get("CA2").await.unwrap().is_none());
    }

    #[test]
    fn test_close_is_once() {
        let mut session = CallSession::new("CA1", "L1", None);
        assert!(session.close(CallOutcome::Completed).is_none());
        assert!(session.phase.is_terminal());

        let mut session = CallSession::new("CA2", "L1", None);
        session.initialized = true;
        session.advance(CallPhase::Greeting);
        let snapshot = session.close(CallOutcome::NoInput).unwrap();
        assert_eq!(snapshot.outcome, CallOutcome::NoInput);
        assert_eq!(snapshot.call_id, "CA2");
        assert!(session.close(CallOutcome::Failed).is_none());
    }

    #[test]
    fn test_phase_advance() {
        let mut session = CallSession::new("CA1", "L1", None);
        session.advance(CallPhase::Greeting);
        session.advance(CallPhase::AwaitingInput);
        session.advance(CallPhase::ProcessingInput);
        session.advance(CallPhase::Ending);
        session.advance(CallPhase::Terminated);
        assert!(session.phase.is_terminal());
    }
}
