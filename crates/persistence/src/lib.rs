//! Record persistence for the outbound call orchestrator
//!
//! Provides storage for:
//! - Leads and their accumulated classification
//! - Tasks, outcome notes and follow-ups
//! - Company configuration
//! - Call logs (transcript, outcome, recording URL)
//! - Company knowledge base
//!
//! ScyllaDB backs production deployments; the in-memory stores serve local
//! runs and tests.

pub mod call_logs;
pub mod client;
pub mod companies;
pub mod error;
pub mod knowledge;
pub mod leads;
pub mod memory;
pub mod schema;
pub mod tasks;

use std::sync::Arc;

use outreach_config::PersistenceConfig;
use outreach_core::RecordStores;

pub use call_logs::ScyllaCallLogStore;
pub use client::{ScyllaClient, ScyllaConfig};
pub use companies::ScyllaCompanyStore;
pub use error::PersistenceError;
pub use knowledge::ScyllaKnowledgeBase;
pub use leads::ScyllaLeadStore;
pub use memory::{
    InMemoryCallLogStore, InMemoryCompanyStore, InMemoryKnowledgeBase, InMemoryLeadStore,
    InMemoryRecords, InMemoryTaskStore,
};
pub use tasks::ScyllaTaskStore;

/// Connect to ScyllaDB and build the store bundle
pub async fn connect(config: ScyllaConfig) -> Result<RecordStores, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(RecordStores {
        leads: Arc::new(ScyllaLeadStore::new(client.clone())),
        tasks: Arc::new(ScyllaTaskStore::new(client.clone())),
        companies: Arc::new(ScyllaCompanyStore::new(client.clone())),
        call_logs: Arc::new(ScyllaCallLogStore::new(client.clone())),
        knowledge: Arc::new(ScyllaKnowledgeBase::new(client)),
    })
}

/// Stores for the configured backend
pub async fn init(config: &PersistenceConfig) -> Result<RecordStores, PersistenceError> {
    if config.enabled {
        connect(ScyllaConfig::from(config)).await
    } else {
        tracing::info!("Persistence disabled, using in-memory record stores");
        Ok(InMemoryRecords::new().stores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_core::Lead;

    #[tokio::test]
    async fn test_init_disabled_uses_memory() {
        let stores = init(&PersistenceConfig::default()).await.unwrap();
        stores.leads.upsert(&Lead::new("L1", "co1", "Sam")).await.unwrap();
        assert!(stores.leads.get("L1").await.unwrap().is_some());
    }
}
