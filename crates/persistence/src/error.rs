//! Persistence errors

use scylla::transport::errors::{NewSessionError, QueryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PersistenceError {
    /// Map a failed read into the shared taxonomy
    pub fn into_lookup(self) -> outreach_core::Error {
        outreach_core::Error::ContextLookupFailed(self.to_string())
    }

    /// Map a failed write into the shared taxonomy
    pub fn into_write(self) -> outreach_core::Error {
        outreach_core::Error::PersistenceFailed(self.to_string())
    }
}

impl From<NewSessionError> for PersistenceError {
    fn from(err: NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<QueryError> for PersistenceError {
    fn from(err: QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::InvalidData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        let err = PersistenceError::Query("timeout".into());
        assert!(matches!(
            err.into_lookup(),
            outreach_core::Error::ContextLookupFailed(_)
        ));

        let err = PersistenceError::NotFound("task T1".into());
        assert!(matches!(
            err.into_write(),
            outreach_core::Error::PersistenceFailed(_)
        ));
    }
}
