//! ScyllaDB client and connection management

use chrono::{DateTime, Utc};
use scylla::{Session, SessionBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use outreach_config::PersistenceConfig;

use crate::error::PersistenceError;
use crate::schema;

/// ScyllaDB configuration
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl From<&PersistenceConfig> for ScyllaConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            hosts: config.scylla_hosts.clone(),
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor,
        }
    }
}

/// ScyllaDB client wrapper
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    /// Connect to ScyllaDB cluster
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    /// Ensure keyspace and tables exist
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(
            &self.session,
            &self.config.keyspace,
            self.config.replication_factor,
        )
        .await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        tracing::info!(keyspace = %self.config.keyspace, "Schema ensured");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }
}

/// Timestamps are stored as BIGINT milliseconds
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

/// Nested values (classification, transcript, notes) are stored as JSON text
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(text: Option<String>) -> Result<Option<T>, PersistenceError> {
    match text {
        Some(text) if !text.is_empty() => Ok(Some(serde_json::from_str(&text)?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_core::Classification;

    #[test]
    fn test_millis_round_trip() {
        let now = Utc::now();
        let restored = from_millis(to_millis(now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_json_helpers() {
        let classification = Classification::default();
        let text = to_json(&classification).unwrap();
        let restored: Option<Classification> = from_json(Some(text)).unwrap();
        assert_eq!(restored, Some(classification));

        let empty: Option<Classification> = from_json(Some(String::new())).unwrap();
        assert!(empty.is_none());
        assert!(from_json::<Classification>(Some("{bad".into())).is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let config = ScyllaConfig::from(&PersistenceConfig::default());
        assert_eq!(config.keyspace, "outreach");
        assert_eq!(config.replication_factor, 1);
    }
}
