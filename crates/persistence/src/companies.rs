//! Company records in ScyllaDB

use async_trait::async_trait;

use outreach_core::{Company, CompanyStore, Result};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaCompanyStore {
    client: ScyllaClient,
}

impl ScyllaCompanyStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, company_id: &str) -> std::result::Result<Option<Company>, PersistenceError> {
        let query = format!(
            "SELECT id, name, product_name, industry, instructions
             FROM {}.companies WHERE id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (company_id,)).await?;
        let Some(row) = result.rows.and_then(|rows| rows.into_iter().next()) else {
            return Ok(None);
        };

        let (id, name, product_name, industry, instructions): (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Some(Company {
            id,
            name,
            product_name,
            industry,
            instructions,
        }))
    }

    async fn write(&self, company: &Company) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.companies (id, name, product_name, industry, instructions)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &company.id,
                    &company.name,
                    &company.product_name,
                    &company.industry,
                    &company.instructions,
                ),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CompanyStore for ScyllaCompanyStore {
    async fn get(&self, company_id: &str) -> Result<Option<Company>> {
        self.fetch(company_id).await.map_err(PersistenceError::into_lookup)
    }

    async fn upsert(&self, company: &Company) -> Result<()> {
        self.write(company).await.map_err(PersistenceError::into_write)
    }
}
