//! Record store traits
//!
//! Reads fail with `ContextLookupFailed`, writes with `PersistenceFailed`.
//! Missing rows are `Ok(None)`, not errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    CallLog, CallOutcome, Classification, Company, HistoryEntry, KnowledgeEntry, Lead, Result,
    Task, TaskStatus,
};

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get(&self, lead_id: &str) -> Result<Option<Lead>>;

    async fn upsert(&self, lead: &Lead) -> Result<()>;

    /// Overwrite the stored classification
    async fn update_classification(
        &self,
        lead_id: &str,
        classification: &Classification,
    ) -> Result<()>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, task_id: &str) -> Result<Option<Task>>;

    /// Insert a new task or replace an existing one
    async fn upsert(&self, task: &Task) -> Result<()>;

    /// Append a note, snapshot the classification and move the status
    async fn record_outcome(
        &self,
        task_id: &str,
        note: &str,
        classification: &Classification,
        status: TaskStatus,
    ) -> Result<()>;

    async fn list_for_lead(&self, lead_id: &str) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn get(&self, company_id: &str) -> Result<Option<Company>>;

    async fn upsert(&self, company: &Company) -> Result<()>;
}

#[async_trait]
pub trait CallLogStore: Send + Sync {
    /// Write the initial row; an existing row is left untouched
    async fn start(&self, log: &CallLog) -> Result<()>;

    async fn get(&self, call_id: &str) -> Result<Option<CallLog>>;

    async fn finalize(
        &self,
        call_id: &str,
        outcome: CallOutcome,
        transcript: &[HistoryEntry],
        classification: &Classification,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn attach_recording(&self, call_id: &str, recording_url: &str) -> Result<()>;
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Best matches for `query` within one company, most relevant first
    async fn search(&self, company_id: &str, query: &str, limit: usize)
        -> Result<Vec<KnowledgeEntry>>;

    async fn add(&self, entry: &KnowledgeEntry) -> Result<()>;
}

/// Bundle of record stores handed to the engine and scheduler
#[derive(Clone)]
pub struct RecordStores {
    pub leads: Arc<dyn LeadStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub companies: Arc<dyn CompanyStore>,
    pub call_logs: Arc<dyn CallLogStore>,
    pub knowledge: Arc<dyn KnowledgeBase>,
}

impl std::fmt::Debug for RecordStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStores").finish_non_exhaustive()
    }
}
