//! Call log records in ScyllaDB

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use outreach_core::{
    CallLog, CallLogStore, CallOutcome, Classification, HistoryEntry, Result,
};

use crate::client::{from_json, from_millis, to_json, to_millis, ScyllaClient};
use crate::error::PersistenceError;

type CallLogRow = (
    String,
    String,
    Option<String>,
    String,
    i64,
    Option<i64>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[derive(Clone)]
pub struct ScyllaCallLogStore {
    client: ScyllaClient,
}

impl ScyllaCallLogStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn insert_if_absent(&self, log: &CallLog) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.call_logs (
                call_id, lead_id, task_id, company_id, started_at, status, transcript_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &log.call_id,
                    &log.lead_id,
                    &log.task_id,
                    &log.company_id,
                    to_millis(log.started_at),
                    log.status.as_str(),
                    to_json(&log.transcript)?,
                ),
            )
            .await?;

        tracing::debug!(call_id = %log.call_id, lead_id = %log.lead_id, "Call log started");
        Ok(())
    }

    async fn fetch(&self, call_id: &str) -> std::result::Result<Option<CallLog>, PersistenceError> {
        let query = format!(
            "SELECT call_id, lead_id, task_id, company_id, started_at, ended_at, status,
                    transcript_json, classification_json, recording_url
             FROM {}.call_logs WHERE call_id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (call_id,)).await?;
        let Some(row) = result.rows.and_then(|rows| rows.into_iter().next()) else {
            return Ok(None);
        };

        let (
            call_id,
            lead_id,
            task_id,
            company_id,
            started_at,
            ended_at,
            status,
            transcript,
            classification,
            recording_url,
        ): CallLogRow = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Some(CallLog {
            call_id,
            lead_id,
            task_id,
            company_id,
            started_at: from_millis(started_at),
            ended_at: ended_at.map(from_millis),
            status: CallOutcome::parse(&status)
                .ok_or_else(|| PersistenceError::InvalidData(format!("call status {}", status)))?,
            transcript: from_json(transcript)?.unwrap_or_default(),
            classification: from_json(classification)?,
            recording_url,
        }))
    }

    async fn close(
        &self,
        call_id: &str,
        outcome: CallOutcome,
        transcript: &[HistoryEntry],
        classification: &Classification,
        ended_at: DateTime<Utc>,
    ) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.call_logs
             SET ended_at = ?, status = ?, transcript_json = ?, classification_json = ?
             WHERE call_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    to_millis(ended_at),
                    outcome.as_str(),
                    to_json(&transcript)?,
                    to_json(classification)?,
                    call_id,
                ),
            )
            .await?;
        Ok(())
    }

    async fn set_recording(&self, call_id: &str, url: &str) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.call_logs SET recording_url = ? WHERE call_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (url, call_id))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CallLogStore for ScyllaCallLogStore {
    async fn start(&self, log: &CallLog) -> Result<()> {
        self.insert_if_absent(log)
            .await
            .map_err(PersistenceError::into_write)
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallLog>> {
        self.fetch(call_id).await.map_err(PersistenceError::into_lookup)
    }

    async fn finalize(
        &self,
        call_id: &str,
        outcome: CallOutcome,
        transcript: &[HistoryEntry],
        classification: &Classification,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        self.close(call_id, outcome, transcript, classification, ended_at)
            .await
            .map_err(PersistenceError::into_write)
    }

    async fn attach_recording(&self, call_id: &str, recording_url: &str) -> Result<()> {
        self.set_recording(call_id, recording_url)
            .await
            .map_err(PersistenceError::into_write)
    }
}
