//! Lead records in ScyllaDB

use async_trait::async_trait;
use chrono::Utc;

use outreach_core::{Classification, Lead, LeadStore, Result};

use crate::client::{from_json, from_millis, to_json, to_millis, ScyllaClient};
use crate::error::PersistenceError;

type LeadRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

#[derive(Clone)]
pub struct ScyllaLeadStore {
    client: ScyllaClient,
}

impl ScyllaLeadStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, lead_id: &str) -> std::result::Result<Option<Lead>, PersistenceError> {
        let query = format!(
            "SELECT id, company_id, name, company, industry, custom_instructions,
                    classification_json, updated_at
             FROM {}.leads WHERE id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (lead_id,)).await?;
        let Some(row) = result.rows.and_then(|rows| rows.into_iter().next()) else {
            return Ok(None);
        };

        let (id, company_id, name, company, industry, custom_instructions, classification, updated_at): LeadRow =
            row.into_typed()
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Some(Lead {
            id,
            company_id,
            name,
            company,
            industry,
            custom_instructions,
            classification: from_json(classification)?,
            updated_at: updated_at.map(from_millis).unwrap_or_else(Utc::now),
        }))
    }

    async fn write(&self, lead: &Lead) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.leads (
                id, company_id, name, company, industry, custom_instructions,
                classification_json, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        let classification = match &lead.classification {
            Some(c) => Some(to_json(c)?),
            None => None,
        };

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &lead.id,
                    &lead.company_id,
                    &lead.name,
                    &lead.company,
                    &lead.industry,
                    &lead.custom_instructions,
                    classification,
                    to_millis(lead.updated_at),
                ),
            )
            .await?;
        Ok(())
    }

    async fn write_classification(
        &self,
        lead_id: &str,
        classification: &Classification,
    ) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.leads SET classification_json = ?, updated_at = ? WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (to_json(classification)?, to_millis(Utc::now()), lead_id),
            )
            .await?;

        tracing::debug!(lead_id, interest = %classification.interest, "Lead classification stored");
        Ok(())
    }
}

#[async_trait]
impl LeadStore for ScyllaLeadStore {
    async fn get(&self, lead_id: &str) -> Result<Option<Lead>> {
        self.fetch(lead_id).await.map_err(PersistenceError::into_lookup)
    }

    async fn upsert(&self, lead: &Lead) -> Result<()> {
        self.write(lead).await.map_err(PersistenceError::into_write)
    }

    async fn update_classification(
        &self,
        lead_id: &str,
        classification: &Classification,
    ) -> Result<()> {
        self.write_classification(lead_id, classification)
            .await
            .map_err(PersistenceError::into_write)
    }
}
