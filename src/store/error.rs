//! Store-layer error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("event {0} not found")]
    EventNotFound(String),

    #[error("decision {0} not found")]
    DecisionNotFound(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
