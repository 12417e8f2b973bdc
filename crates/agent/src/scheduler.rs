//! Insight and follow-up scheduling
//!
//! Runs after a call ends, off the response path. Every write is
//! best-effort: failures are logged and counted, never surfaced to the
//! caller, and one failed write does not stop the others.

use chrono::Utc;
use tokio::task::JoinHandle;

use outreach_core::{
    CallLog, CallOutcome, Classification, Error, HistoryEntry, RecordStores, Task, TaskStatus,
};

/// Everything the scheduler needs once the session is gone
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    pub call_id: String,
    pub lead_id: String,
    pub task_id: Option<String>,
    pub company_id: String,
    pub classification: Classification,
    pub transcript: Vec<HistoryEntry>,
    pub outcome: CallOutcome,
}

#[derive(Clone)]
pub struct FollowUpScheduler {
    stores: RecordStores,
}

impl FollowUpScheduler {
    pub fn new(stores: RecordStores) -> Self {
        Self { stores }
    }

    /// Write the call-log row for a new call
    pub async fn record_call_start(&self, log: &CallLog) {
        if let Err(e) = self.stores.call_logs.start(log).await {
            persistence_failed("call_log_start", &log.call_id, &e);
        }
    }

    /// Per-turn classification write on the lead
    pub async fn record_turn(&self, lead_id: &str, classification: &Classification) {
        if lead_id.is_empty() {
            return;
        }
        if let Err(e) = self
            .stores
            .leads
            .update_classification(lead_id, classification)
            .await
        {
            persistence_failed("lead_classification", lead_id, &e);
        }
    }

    pub async fn attach_recording(&self, call_id: &str, recording_url: &str) {
        if let Err(e) = self
            .stores
            .call_logs
            .attach_recording(call_id, recording_url)
            .await
        {
            persistence_failed("call_log_recording", call_id, &e);
        }
    }

    /// Persist everything learned on the call.
    ///
    /// Returns the follow-up task when one was created.
    pub async fn flush(&self, snapshot: CallSnapshot) -> Option<Task> {
        let classification = &snapshot.classification;
        let now = Utc::now();

        self.record_turn(&snapshot.lead_id, classification).await;

        let parent = match &snapshot.task_id {
            Some(task_id) => self.update_parent_task(task_id, &snapshot).await,
            None => None,
        };

        let follow_up = if classification.needs_follow_up {
            let task = match &parent {
                Some(parent) => parent.follow_up(classification, now),
                None => {
                    let mut task = Task::new(&snapshot.company_id, &snapshot.lead_id)
                        .follow_up(classification, now);
                    task.parent_task_id = snapshot.task_id.clone();
                    task
                }
            };
            match self.stores.tasks.upsert(&task).await {
                Ok(()) => {
                    metrics::counter!("outreach_follow_ups_created_total").increment(1);
                    tracing::info!(
                        call_id = %snapshot.call_id,
                        lead_id = %snapshot.lead_id,
                        follow_up_id = %task.id,
                        priority = task.priority,
                        scheduled_at = %task.scheduled_at,
                        "Follow-up scheduled"
                    );
                    Some(task)
                }
                Err(e) => {
                    persistence_failed("follow_up_task", &snapshot.lead_id, &e);
                    None
                }
            }
        } else {
            None
        };

        if let Err(e) = self
            .stores
            .call_logs
            .finalize(
                &snapshot.call_id,
                snapshot.outcome,
                &snapshot.transcript,
                classification,
                now,
            )
            .await
        {
            persistence_failed("call_log_finalize", &snapshot.call_id, &e);
        }

        tracing::info!(
            call_id = %snapshot.call_id,
            outcome = snapshot.outcome.as_str(),
            interest = %classification.interest,
            turns = snapshot.transcript.len(),
            "Call flushed"
        );
        follow_up
    }

    /// Run [`flush`](Self::flush) on the runtime without blocking the caller
    pub fn spawn_flush(&self, snapshot: CallSnapshot) -> JoinHandle<Option<Task>> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.flush(snapshot).await })
    }

    async fn update_parent_task(&self, task_id: &str, snapshot: &CallSnapshot) -> Option<Task> {
        let classification = &snapshot.classification;
        let status = if classification.needs_follow_up {
            TaskStatus::InProgress
        } else {
            TaskStatus::Completed
        };
        let note = format!(
            "Call {} ended ({}): {}",
            snapshot.call_id,
            snapshot.outcome.as_str(),
            classification.summary()
        );

        if let Err(e) = self
            .stores
            .tasks
            .record_outcome(task_id, &note, classification, status)
            .await
        {
            persistence_failed("task_outcome", task_id, &e);
        }

        match self.stores.tasks.get(task_id).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Parent task lookup failed");
                None
            }
        }
    }
}

fn persistence_failed(write: &'static str, id: &str, error: &Error) {
    metrics::counter!("outreach_persistence_failures_total", "write" => write).increment(1);
    let error = match error {
        Error::PersistenceFailed(_) => error.clone(),
        other => Error::PersistenceFailed(other.to_string()),
    };
    tracing::error!(write, id, error = %error, "Write-back failed");
}
