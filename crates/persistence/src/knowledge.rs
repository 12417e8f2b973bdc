//! Company knowledge base in ScyllaDB
//!
//! Entries are partitioned by company and ranked in-process by keyword
//! overlap; a company's knowledge base is small enough to scan.

use async_trait::async_trait;

use outreach_core::{KnowledgeBase, KnowledgeEntry, Result};

use crate::client::{from_json, to_json, ScyllaClient};
use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ScyllaKnowledgeBase {
    client: ScyllaClient,
}

impl ScyllaKnowledgeBase {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn load(&self, company_id: &str) -> std::result::Result<Vec<KnowledgeEntry>, PersistenceError> {
        let query = format!(
            "SELECT company_id, id, title, content, tags_json FROM {}.knowledge WHERE company_id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (company_id,)).await?;

        let mut entries = Vec::new();
        for row in result.rows.unwrap_or_default() {
            let (company_id, id, title, content, tags): (
                String,
                String,
                String,
                String,
                Option<String>,
            ) = row
                .into_typed()
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            entries.push(KnowledgeEntry {
                id,
                company_id,
                title,
                content,
                tags: from_json(tags)?.unwrap_or_default(),
            });
        }
        Ok(entries)
    }

    async fn insert(&self, entry: &KnowledgeEntry) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.knowledge (company_id, id, title, content, tags_json) VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &entry.company_id,
                    &entry.id,
                    &entry.title,
                    &entry.content,
                    to_json(&entry.tags)?,
                ),
            )
            .await?;
        Ok(())
    }
}

/// Most relevant entries first; entries sharing no keyword are dropped
pub(crate) fn rank(entries: Vec<KnowledgeEntry>, query: &str, limit: usize) -> Vec<KnowledgeEntry> {
    let mut scored: Vec<(usize, KnowledgeEntry)> = entries
        .into_iter()
        .map(|e| (e.relevance(query), e))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    scored.into_iter().take(limit).map(|(_, e)| e).collect()
}

#[async_trait]
impl KnowledgeBase for ScyllaKnowledgeBase {
    async fn search(&self, company_id: &str, query: &str, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        let entries = self
            .load(company_id)
            .await
            .map_err(PersistenceError::into_lookup)?;
        Ok(rank(entries, query, limit))
    }

    async fn add(&self, entry: &KnowledgeEntry) -> Result<()> {
        self.insert(entry).await.map_err(PersistenceError::into_write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, content: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.into(),
            company_id: "co1".into(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_rank_orders_by_overlap() {
        let entries = vec![
            entry("a", "Support", "Phone support is available all week"),
            entry("b", "Pricing", "The starter plan price is $49 per month"),
            entry("c", "Pricing tiers", "Starter plan price and team plan price"),
        ];
        let ranked = rank(entries, "what is the starter plan price", 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "b");
        assert_eq!(ranked[1].id, "c");
    }

    #[test]
    fn test_rank_drops_unrelated() {
        let ranked = rank(vec![entry("a", "Support", "Phone support")], "pricing", 3);
        assert!(ranked.is_empty());
    }
}
