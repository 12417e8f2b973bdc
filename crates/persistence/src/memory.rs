//! In-memory record stores
//!
//! Used when ScyllaDB persistence is disabled and in tests. Semantics match
//! the ScyllaDB stores: missing rows are `Ok(None)`, updates to missing rows
//! fail with `PersistenceFailed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use outreach_core::{
    CallLog, CallLogStore, CallOutcome, Classification, Company, CompanyStore, Error,
    HistoryEntry, KnowledgeBase, KnowledgeEntry, Lead, LeadStore, RecordStores, Result, Task,
    TaskStatus, TaskStore,
};

use crate::knowledge::rank;

#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<String, Lead>>,
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn get(&self, lead_id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.read().get(lead_id).cloned())
    }

    async fn upsert(&self, lead: &Lead) -> Result<()> {
        self.leads.write().insert(lead.id.clone(), lead.clone());
        Ok(())
    }

    async fn update_classification(
        &self,
        lead_id: &str,
        classification: &Classification,
    ) -> Result<()> {
        let mut leads = self.leads.write();
        let lead = leads
            .get_mut(lead_id)
            .ok_or_else(|| Error::PersistenceFailed(format!("lead {} not found", lead_id)))?;
        lead.classification = Some(classification.clone());
        lead.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.read().get(task_id).cloned())
    }

    async fn upsert(&self, task: &Task) -> Result<()> {
        self.tasks.write().insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn record_outcome(
        &self,
        task_id: &str,
        note: &str,
        classification: &Classification,
        status: TaskStatus,
    ) -> Result<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::PersistenceFailed(format!("task {} not found", task_id)))?;
        task.notes.push(note.to_string());
        task.classification = Some(classification.clone());
        task.status = status;
        Ok(())
    }

    async fn list_for_lead(&self, lead_id: &str) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.lead_id == lead_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.scheduled_at);
        Ok(tasks)
    }
}

#[derive(Default)]
pub struct InMemoryCompanyStore {
    companies: RwLock<HashMap<String, Company>>,
}

#[async_trait]
impl CompanyStore for InMemoryCompanyStore {
    async fn get(&self, company_id: &str) -> Result<Option<Company>> {
        Ok(self.companies.read().get(company_id).cloned())
    }

    async fn upsert(&self, company: &Company) -> Result<()> {
        self.companies
            .write()
            .insert(company.id.clone(), company.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCallLogStore {
    logs: RwLock<HashMap<String, CallLog>>,
}

#[async_trait]
impl CallLogStore for InMemoryCallLogStore {
    async fn start(&self, log: &CallLog) -> Result<()> {
        self.logs
            .write()
            .entry(log.call_id.clone())
            .or_insert_with(|| log.clone());
        Ok(())
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallLog>> {
        Ok(self.logs.read().get(call_id).cloned())
    }

    async fn finalize(
        &self,
        call_id: &str,
        outcome: CallOutcome,
        transcript: &[HistoryEntry],
        classification: &Classification,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut logs = self.logs.write();
        let log = logs
            .get_mut(call_id)
            .ok_or_else(|| Error::PersistenceFailed(format!("call log {} not found", call_id)))?;
        log.status = outcome;
        log.transcript = transcript.to_vec();
        log.classification = Some(classification.clone());
        log.ended_at = Some(ended_at);
        Ok(())
    }

    async fn attach_recording(&self, call_id: &str, recording_url: &str) -> Result<()> {
        let mut logs = self.logs.write();
        let log = logs
            .get_mut(call_id)
            .ok_or_else(|| Error::PersistenceFailed(format!("call log {} not found", call_id)))?;
        log.recording_url = Some(recording_url.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    entries: RwLock<Vec<KnowledgeEntry>>,
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn search(&self, company_id: &str, query: &str, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        let candidates: Vec<KnowledgeEntry> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect();
        Ok(rank(candidates, query, limit))
    }

    async fn add(&self, entry: &KnowledgeEntry) -> Result<()> {
        let mut entries = self.entries.write();
        entries.retain(|e| !(e.company_id == entry.company_id && e.id == entry.id));
        entries.push(entry.clone());
        Ok(())
    }
}

/// A full set of in-memory stores sharing one process lifetime
#[derive(Clone, Default)]
pub struct InMemoryRecords {
    pub leads: Arc<InMemoryLeadStore>,
    pub tasks: Arc<InMemoryTaskStore>,
    pub companies: Arc<InMemoryCompanyStore>,
    pub call_logs: Arc<InMemoryCallLogStore>,
    pub knowledge: Arc<InMemoryKnowledgeBase>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trait-object view handed to the engine and scheduler
    pub fn stores(&self) -> RecordStores {
        RecordStores {
            leads: self.leads.clone(),
            tasks: self.tasks.clone(),
            companies: self.companies.clone(),
            call_logs: self.call_logs.clone(),
            knowledge: self.knowledge.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_core::InterestLevel;

    #[tokio::test]
    async fn test_lead_classification_update() {
        let stores = InMemoryRecords::new().stores();
        stores.leads.upsert(&Lead::new("L1", "co1", "Sam")).await.unwrap();

        let classification = Classification {
            interest: InterestLevel::High,
            ..Default::default()
        };
        stores
            .leads
            .update_classification("L1", &classification)
            .await
            .unwrap();

        let lead = stores.leads.get("L1").await.unwrap().unwrap();
        assert_eq!(lead.classification, Some(classification.clone()));

        let err = stores
            .leads
            .update_classification("missing", &classification)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PersistenceFailed(_)));
    }

    #[tokio::test]
    async fn test_call_log_start_keeps_existing_row() {
        let stores = InMemoryRecords::new().stores();
        let first = CallLog::start("CA1", "L1", None, "co1");
        stores.call_logs.start(&first).await.unwrap();

        let second = CallLog::start("CA1", "L2", None, "co1");
        stores.call_logs.start(&second).await.unwrap();

        let stored = stores.call_logs.get("CA1").await.unwrap().unwrap();
        assert_eq!(stored.lead_id, "L1");
    }

    #[tokio::test]
    async fn test_call_log_finalize_and_recording() {
        let stores = InMemoryRecords::new().stores();
        stores
            .call_logs
            .start(&CallLog::start("CA1", "L1", None, "co1"))
            .await
            .unwrap();

        let now = Utc::now();
        stores
            .call_logs
            .finalize(
                "CA1",
                CallOutcome::Completed,
                &[HistoryEntry::agent("Hi Sam, this is Alex from Acme.")],
                &Classification::default(),
                now,
            )
            .await
            .unwrap();
        stores
            .call_logs
            .attach_recording("CA1", "https://recordings.example/CA1.wav")
            .await
            .unwrap();

        let log = stores.call_logs.get("CA1").await.unwrap().unwrap();
        assert_eq!(log.status, CallOutcome::Completed);
        assert_eq!(log.ended_at, Some(now));
        assert_eq!(log.transcript.len(), 1);
        assert!(log.recording_url.is_some());

        assert!(stores
            .call_logs
            .attach_recording("CA404", "https://recordings.example/x.wav")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_knowledge_scoped_by_company() {
        let stores = InMemoryRecords::new().stores();
        for (company, id) in [("co1", "k1"), ("co2", "k2")] {
            stores
                .knowledge
                .add(&KnowledgeEntry {
                    id: id.into(),
                    company_id: company.into(),
                    title: "Pricing".into(),
                    content: "Plans start at $49".into(),
                    tags: vec!["price".into()],
                })
                .await
                .unwrap();
        }

        let results = stores.knowledge.search("co1", "what is the price", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "k1");
    }

    #[tokio::test]
    async fn test_task_outcome_and_listing() {
        let stores = InMemoryRecords::new().stores();
        let task = Task::new("co1", "L1");
        stores.tasks.upsert(&task).await.unwrap();
        stores.tasks.upsert(&Task::new("co1", "L2")).await.unwrap();

        stores
            .tasks
            .record_outcome(&task.id, "Call ended", &Classification::default(), TaskStatus::Completed)
            .await
            .unwrap();

        let listed = stores.tasks.list_for_lead("L1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, TaskStatus::Completed);
        assert_eq!(listed[0].notes, vec!["Call ended".to_string()]);
    }
}
