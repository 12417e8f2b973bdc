//! ScyllaDB schema creation
//!
//! Timestamps are BIGINT epoch milliseconds; nested values are JSON text.

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Table definitions, in creation order
fn table_statements(keyspace: &str) -> Vec<(&'static str, String)> {
    vec![
        (
            "leads",
            format!(
                r#"
        CREATE TABLE IF NOT EXISTS {}.leads (
            id TEXT,
            company_id TEXT,
            name TEXT,
            company TEXT,
            industry TEXT,
            custom_instructions TEXT,
            classification_json TEXT,
            updated_at BIGINT,
            PRIMARY KEY (id)
        )"#,
                keyspace
            ),
        ),
        (
            "tasks",
            format!(
                r#"
        CREATE TABLE IF NOT EXISTS {}.tasks (
            id TEXT,
            company_id TEXT,
            lead_id TEXT,
            status TEXT,
            priority INT,
            scheduled_at BIGINT,
            instructions TEXT,
            notes_json TEXT,
            classification_json TEXT,
            parent_task_id TEXT,
            PRIMARY KEY (id)
        )"#,
                keyspace
            ),
        ),
        (
            "tasks_by_lead",
            format!(
                r#"
        CREATE TABLE IF NOT EXISTS {}.tasks_by_lead (
            lead_id TEXT,
            task_id TEXT,
            PRIMARY KEY ((lead_id), task_id)
        )"#,
                keyspace
            ),
        ),
        (
            "companies",
            format!(
                r#"
        CREATE TABLE IF NOT EXISTS {}.companies (
            id TEXT,
            name TEXT,
            product_name TEXT,
            industry TEXT,
            instructions TEXT,
            PRIMARY KEY (id)
        )"#,
                keyspace
            ),
        ),
        (
            "call_logs",
            format!(
                r#"
        CREATE TABLE IF NOT EXISTS {}.call_logs (
            call_id TEXT,
            lead_id TEXT,
            task_id TEXT,
            company_id TEXT,
            started_at BIGINT,
            ended_at BIGINT,
            status TEXT,
            transcript_json TEXT,
            classification_json TEXT,
            recording_url TEXT,
            PRIMARY KEY (call_id)
        )"#,
                keyspace
            ),
        ),
        (
            "knowledge",
            format!(
                r#"
        CREATE TABLE IF NOT EXISTS {}.knowledge (
            company_id TEXT,
            id TEXT,
            title TEXT,
            content TEXT,
            tags_json TEXT,
            PRIMARY KEY ((company_id), id)
        )"#,
                keyspace
            ),
        ),
    ]
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    for (table, statement) in table_statements(keyspace) {
        session.query_unpaged(statement, &[]).await.map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create {} table: {}", table, e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_use_keyspace() {
        let statements = table_statements("outreach_test");
        assert_eq!(statements.len(), 6);
        for (table, statement) in statements {
            assert!(
                statement.contains(&format!("outreach_test.{} (", table)),
                "{} statement should target the keyspace",
                table
            );
        }
    }
}
