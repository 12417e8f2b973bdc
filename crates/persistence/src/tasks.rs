//! Task records in ScyllaDB
//!
//! `tasks_by_lead` is a lookup table maintained alongside `tasks` so a lead's
//! tasks can be listed without ALLOW FILTERING.

use async_trait::async_trait;
use chrono::Utc;

use outreach_core::{Classification, Result, Task, TaskStatus, TaskStore};

use crate::client::{from_json, from_millis, to_json, to_millis, ScyllaClient};
use crate::error::PersistenceError;

type TaskRow = (
    String,
    String,
    String,
    String,
    Option<i32>,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[derive(Clone)]
pub struct ScyllaTaskStore {
    client: ScyllaClient,
}

impl ScyllaTaskStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, task_id: &str) -> std::result::Result<Option<Task>, PersistenceError> {
        let query = format!(
            "SELECT id, company_id, lead_id, status, priority, scheduled_at,
                    instructions, notes_json, classification_json, parent_task_id
             FROM {}.tasks WHERE id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (task_id,)).await?;
        match result.rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => {
                let row: TaskRow = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                Ok(Some(row_to_task(row)?))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, task: &Task) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.tasks (
                id, company_id, lead_id, status, priority, scheduled_at,
                instructions, notes_json, classification_json, parent_task_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        let classification = match &task.classification {
            Some(c) => Some(to_json(c)?),
            None => None,
        };

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &task.id,
                    &task.company_id,
                    &task.lead_id,
                    task.status.as_str(),
                    i32::from(task.priority),
                    to_millis(task.scheduled_at),
                    &task.instructions,
                    to_json(&task.notes)?,
                    classification,
                    &task.parent_task_id,
                ),
            )
            .await?;

        let index = format!(
            "INSERT INTO {}.tasks_by_lead (lead_id, task_id) VALUES (?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(index, (&task.lead_id, &task.id))
            .await?;

        tracing::debug!(task_id = %task.id, lead_id = %task.lead_id, status = %task.status, "Task stored");
        Ok(())
    }

    async fn apply_outcome(
        &self,
        task_id: &str,
        note: &str,
        classification: &Classification,
        status: TaskStatus,
    ) -> std::result::Result<(), PersistenceError> {
        let mut task = self
            .fetch(task_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("task {}", task_id)))?;
        task.notes.push(note.to_string());
        task.classification = Some(classification.clone());
        task.status = status;
        self.write(&task).await
    }

    async fn list(&self, lead_id: &str) -> std::result::Result<Vec<Task>, PersistenceError> {
        let query = format!(
            "SELECT task_id FROM {}.tasks_by_lead WHERE lead_id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (lead_id,)).await?;

        let mut tasks = Vec::new();
        for row in result.rows.unwrap_or_default() {
            let (task_id,): (String,) = row
                .into_typed()
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            if let Some(task) = self.fetch(&task_id).await? {
                tasks.push(task);
            }
        }
        tasks.sort_by_key(|t| t.scheduled_at);
        Ok(tasks)
    }
}

fn row_to_task(row: TaskRow) -> std::result::Result<Task, PersistenceError> {
    let (
        id,
        company_id,
        lead_id,
        status,
        priority,
        scheduled_at,
        instructions,
        notes,
        classification,
        parent_task_id,
    ) = row;

    Ok(Task {
        id,
        company_id,
        lead_id,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| PersistenceError::InvalidData(format!("task status {}", status)))?,
        priority: priority.map(|p| p.clamp(1, 5) as u8).unwrap_or(3),
        scheduled_at: scheduled_at.map(from_millis).unwrap_or_else(Utc::now),
        instructions,
        notes: from_json(notes)?.unwrap_or_default(),
        classification: from_json(classification)?,
        parent_task_id,
    })
}

#[async_trait]
impl TaskStore for ScyllaTaskStore {
    async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        self.fetch(task_id).await.map_err(PersistenceError::into_lookup)
    }

    async fn upsert(&self, task: &Task) -> Result<()> {
        self.write(task).await.map_err(PersistenceError::into_write)
    }

    async fn record_outcome(
        &self,
        task_id: &str,
        note: &str,
        classification: &Classification,
        status: TaskStatus,
    ) -> Result<()> {
        self.apply_outcome(task_id, note, classification, status)
            .await
            .map_err(PersistenceError::into_write)
    }

    async fn list_for_lead(&self, lead_id: &str) -> Result<Vec<Task>> {
        self.list(lead_id).await.map_err(PersistenceError::into_lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_task() {
        let row: TaskRow = (
            "T1".into(),
            "co1".into(),
            "L1".into(),
            "in_progress".into(),
            Some(9),
            Some(1_700_000_000_000),
            None,
            Some("[\"called\"]".into()),
            None,
            Some("T0".into()),
        );
        let task = row_to_task(row).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, 5);
        assert_eq!(task.notes, vec!["called".to_string()]);
        assert_eq!(task.parent_task_id.as_deref(), Some("T0"));
    }

    #[test]
    fn test_row_with_unknown_status_rejected() {
        let row: TaskRow = (
            "T1".into(),
            "co1".into(),
            "L1".into(),
            "archived".into(),
            None,
            None,
            None,
            None,
            None,
            None,
        );
        assert!(matches!(row_to_task(row), Err(PersistenceError::InvalidData(_))));
    }
}
